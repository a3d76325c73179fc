use std::env;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::batch::{BatchConfig, FailurePolicy, ReportOrder};
use crate::cli::{CliArgs, CliSources};
use crate::prompt::InputPrompt;

const PROJECT_CONFIG_FILE: &str = "volume-metrics.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    template: Option<String>,
    directory: Option<String>,
    parallel_limit: Option<usize>,
    extension: Option<String>,
    failure_policy: Option<String>,
    report_order: Option<String>,
    output: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
    Missing {
        field: &'static str,
    },
    Prompt {
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
            ConfigError::Missing { field } => {
                write!(f, "no {field} given; exiting before any processing")
            }
            ConfigError::Prompt { source } => {
                write!(f, "failed to read answer from terminal: {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Prompt { source } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
            ConfigError::Missing { .. } => None,
        }
    }
}

/// Merges command line, config file and (for required inputs only) the
/// prompt into a batch configuration. `prompt` is `None` when asking is not
/// allowed.
pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
    prompt: Option<&mut dyn InputPrompt>,
) -> Result<BatchConfig, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path, prompt)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        return read_config(path);
    }

    if let Some(project_path) = project_config_path() {
        if project_path.exists() {
            return read_config(project_path);
        }
    }

    let Some(default_path) = default_config_path() else {
        return Ok((FileConfig::default(), None));
    };
    if !default_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    read_config(default_path)
}

fn read_config(path: PathBuf) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    Ok((config, Some(path)))
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
    mut prompt: Option<&mut dyn InputPrompt>,
) -> Result<BatchConfig, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        template: file_template,
        directory: file_directory,
        parallel_limit: file_parallel_limit,
        extension: file_extension,
        failure_policy: file_failure_policy,
        report_order: file_report_order,
        output: file_output,
    } = file;

    // Prompts follow the order the inputs are needed in: limit, template,
    // directory.
    let parallel_limit = match cli.parallel {
        Some(value) => NonZeroUsize::new(value as usize).ok_or(ConfigError::InvalidValue {
            path: None,
            field: "parallel",
            value: value.to_string(),
        })?,
        None => match file_parallel_limit {
            Some(value) => NonZeroUsize::new(value).ok_or_else(|| ConfigError::InvalidValue {
                path: config_path.clone(),
                field: "parallel_limit",
                value: value.to_string(),
            })?,
            None => ask(&mut prompt, "parallel limit", |p| p.parallel_limit())?,
        },
    };

    let template = match cli.template.clone() {
        Some(path) => expand_pathbuf(path),
        None => match normalize_string(file_template)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
        {
            Some(path) => path,
            None => expand_pathbuf(ask(&mut prompt, "template file", |p| p.template())?),
        },
    };

    let directory = match cli.directory.clone() {
        Some(path) => expand_pathbuf(path),
        None => match normalize_string(file_directory)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
        {
            Some(path) => path,
            None => expand_pathbuf(ask(&mut prompt, "directory", |p| p.directory())?),
        },
    };

    let mut extension = cli.extension.clone();
    if !sources.extension_from_cli {
        if let Some(value) = normalize_string(file_extension) {
            extension = value;
        }
    }
    let raw_extension = extension;
    let extension = raw_extension.trim().trim_start_matches('.').to_string();
    if extension.is_empty() {
        return Err(ConfigError::InvalidValue {
            path: if sources.extension_from_cli {
                None
            } else {
                config_path.clone()
            },
            field: "extension",
            value: raw_extension,
        });
    }

    let failure_policy = if cli.fail_fast {
        FailurePolicy::FailFast
    } else if let Some(value) = normalize_string(file_failure_policy) {
        value
            .parse::<FailurePolicy>()
            .map_err(|value| ConfigError::InvalidValue {
                path: config_path.clone(),
                field: "failure_policy",
                value,
            })?
    } else {
        FailurePolicy::default()
    };

    let mut report_order = cli.report_order;
    if !sources.report_order_from_cli {
        if let Some(value) = normalize_string(file_report_order) {
            report_order = parse_report_order(&value, config_path.as_ref())?;
        }
    }

    let output = match cli.output.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_output)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref())),
    };

    Ok(BatchConfig {
        template,
        directory,
        parallel_limit,
        extension,
        failure_policy,
        report_order,
        output,
    })
}

fn ask<T>(
    prompt: &mut Option<&mut dyn InputPrompt>,
    field: &'static str,
    question: impl FnOnce(&mut dyn InputPrompt) -> std::io::Result<Option<T>>,
) -> Result<T, ConfigError> {
    let Some(prompt) = prompt.as_deref_mut() else {
        return Err(ConfigError::Missing { field });
    };
    question(prompt)
        .map_err(|source| ConfigError::Prompt { source })?
        .ok_or(ConfigError::Missing { field })
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "volume-metrics", "volume-metrics")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

fn parse_report_order(value: &str, path: Option<&PathBuf>) -> Result<ReportOrder, ConfigError> {
    ReportOrder::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field: "report_order",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    struct Scripted {
        limit: Option<NonZeroUsize>,
        template: Option<PathBuf>,
        directory: Option<PathBuf>,
        asked: Vec<&'static str>,
    }

    impl InputPrompt for Scripted {
        fn parallel_limit(&mut self) -> io::Result<Option<NonZeroUsize>> {
            self.asked.push("parallel");
            Ok(self.limit)
        }

        fn template(&mut self) -> io::Result<Option<PathBuf>> {
            self.asked.push("template");
            Ok(self.template.clone())
        }

        fn directory(&mut self) -> io::Result<Option<PathBuf>> {
            self.asked.push("directory");
            Ok(self.directory.clone())
        }
    }

    fn cli(args: &[&str]) -> (CliArgs, CliSources) {
        let mut argv = vec!["volume-metrics"];
        argv.extend_from_slice(args);
        let matches = CliArgs::command().try_get_matches_from(argv).unwrap();
        let parsed = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources::from_matches(&matches);
        (parsed, sources)
    }

    fn file(text: &str) -> FileConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn cli_values_need_no_prompt() {
        let (args, sources) = cli(&["-t", "/a/t.nrrd", "-d", "/scans", "-j", "4"]);
        let config = merge(&args, &sources, FileConfig::default(), None, None).unwrap();
        assert_eq!(config.template, PathBuf::from("/a/t.nrrd"));
        assert_eq!(config.directory, PathBuf::from("/scans"));
        assert_eq!(config.parallel_limit.get(), 4);
        assert_eq!(config.extension, "nrrd");
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.report_order, ReportOrder::Arrival);
    }

    #[test]
    fn config_file_fills_gaps_relative_to_its_directory() {
        let (args, sources) = cli(&[]);
        let file = file(
            r#"
            template = "atlas/t.nrrd"
            directory = "/data/scans"
            parallel_limit = 6
            extension = ".nhdr"
            failure_policy = "fail-fast"
            report_order = "name"
            "#,
        );
        let config = merge(
            &args,
            &sources,
            file,
            Some(PathBuf::from("/etc/vm/config.toml")),
            None,
        )
        .unwrap();
        assert_eq!(config.template, PathBuf::from("/etc/vm/atlas/t.nrrd"));
        assert_eq!(config.directory, PathBuf::from("/data/scans"));
        assert_eq!(config.parallel_limit.get(), 6);
        assert_eq!(config.extension, "nhdr");
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.report_order, ReportOrder::Name);
    }

    #[test]
    fn cli_overrides_config_file() {
        let (args, sources) = cli(&["-j", "2", "--report-order", "arrival", "--extension", "nrrd"]);
        let file = file(
            "template = \"/t.nrrd\"\ndirectory = \"/d\"\nparallel_limit = 9\nreport_order = \"name\"\nextension = \"raw\"\n",
        );
        let config = merge(&args, &sources, file, None, None).unwrap();
        assert_eq!(config.parallel_limit.get(), 2);
        assert_eq!(config.report_order, ReportOrder::Arrival);
        assert_eq!(config.extension, "nrrd");
    }

    #[test]
    fn prompts_only_for_missing_inputs_in_order() {
        let (args, sources) = cli(&["-d", "/scans"]);
        let mut prompt = Scripted {
            limit: NonZeroUsize::new(3),
            template: Some(PathBuf::from("/t.nrrd")),
            directory: None,
            asked: Vec::new(),
        };
        let config = merge(
            &args,
            &sources,
            FileConfig::default(),
            None,
            Some(&mut prompt),
        )
        .unwrap();
        assert_eq!(config.parallel_limit.get(), 3);
        assert_eq!(config.template, PathBuf::from("/t.nrrd"));
        assert_eq!(prompt.asked, vec!["parallel", "template"]);
    }

    #[test]
    fn declined_prompt_is_a_missing_input() {
        let (args, sources) = cli(&["-j", "1"]);
        let mut prompt = Scripted {
            limit: None,
            template: None,
            directory: None,
            asked: Vec::new(),
        };
        let err = merge(
            &args,
            &sources,
            FileConfig::default(),
            None,
            Some(&mut prompt),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                field: "template file"
            }
        ));
        assert_eq!(prompt.asked, vec!["template"]);
    }

    #[test]
    fn missing_inputs_without_prompt_fail() {
        let (args, sources) = cli(&[]);
        let err = merge(&args, &sources, FileConfig::default(), None, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                field: "parallel limit"
            }
        ));
    }

    #[test]
    fn zero_parallel_limit_in_file_is_invalid() {
        let (args, sources) = cli(&[]);
        let err = merge(
            &args,
            &sources,
            file("parallel_limit = 0"),
            Some(PathBuf::from("/cfg/config.toml")),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("parallel_limit"));
    }

    #[test]
    fn unknown_policy_is_invalid() {
        let (args, sources) = cli(&["-t", "/t.nrrd", "-d", "/d", "-j", "1"]);
        let err = merge(&args, &sources, file("failure_policy = \"maybe\""), None, None)
            .unwrap_err();
        assert!(err.to_string().contains("failure_policy"));
    }

    #[test]
    fn explicit_missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_config_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "parallel_limit = [").unwrap();
        assert!(matches!(
            load_config(Some(&path)).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
