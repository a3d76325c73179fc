use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::batch::ReportOrder;

#[derive(Debug, Default)]
pub struct CliSources {
    pub extension_from_cli: bool,
    pub report_order_from_cli: bool,
}

impl CliSources {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            extension_from_cli: value_from_cli(matches, "extension"),
            report_order_from_cli: value_from_cli(matches, "report_order"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "volume-metrics",
    about = "Compare NRRD volumes against a template and write similarity metrics to CSV",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Template volume every other volume is compared against
    #[arg(short = 't', long = "template", value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Directory scanned for volumes to compare
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Number of volumes loaded and compared in parallel
    #[arg(
        short = 'j',
        long = "parallel",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub parallel: Option<u32>,

    /// File extension (without the dot) of the volumes to pick up
    #[arg(long = "extension", id = "extension", default_value = "nrrd")]
    pub extension: String,

    /// Report path, defaults to <DIR>/<template>+correlation-metrics.csv
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Abort without a report on the first unreadable volume
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Row order of the report
    #[arg(
        long = "report-order",
        id = "report_order",
        value_enum,
        default_value_t = ReportOrder::Arrival
    )]
    pub report_order: ReportOrder,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Fail instead of asking for missing inputs on the terminal
    #[arg(long = "no-prompt")]
    pub no_prompt: bool,

    /// Log per-volume timings
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> (CliArgs, CliSources) {
        let matches = CliArgs::command()
            .try_get_matches_from(args)
            .expect("arguments parse");
        let cli = CliArgs::from_arg_matches(&matches).expect("arguments convert");
        (cli, CliSources::from_matches(&matches))
    }

    #[test]
    fn defaults_are_not_marked_as_cli_values() {
        let (cli, sources) = parse(&["volume-metrics"]);
        assert_eq!(cli.extension, "nrrd");
        assert_eq!(cli.report_order, ReportOrder::Arrival);
        assert!(!sources.extension_from_cli);
        assert!(!sources.report_order_from_cli);
    }

    #[test]
    fn explicit_values_are_tracked() {
        let (cli, sources) = parse(&[
            "volume-metrics",
            "-t",
            "atlas.nrrd",
            "--dir",
            "scans",
            "-j",
            "3",
            "--report-order",
            "name",
            "--fail-fast",
        ]);
        assert_eq!(cli.template, Some(PathBuf::from("atlas.nrrd")));
        assert_eq!(cli.parallel, Some(3));
        assert_eq!(cli.report_order, ReportOrder::Name);
        assert!(cli.fail_fast);
        assert!(sources.report_order_from_cli);
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(
            CliArgs::command()
                .try_get_matches_from(["volume-metrics", "-j", "0"])
                .is_err()
        );
    }
}
