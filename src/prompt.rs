use std::io::{self, BufRead, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Source of the required inputs that were not given on the command line or
/// in a config file. `Ok(None)` means the user declined to answer.
pub trait InputPrompt {
    fn parallel_limit(&mut self) -> io::Result<Option<NonZeroUsize>>;
    fn template(&mut self) -> io::Result<Option<PathBuf>>;
    fn directory(&mut self) -> io::Result<Option<PathBuf>>;
}

/// Line-based prompt: questions go to `output`, answers come from `input`.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(answer.to_string()))
        }
    }

    fn ask_path(&mut self, question: &str) -> io::Result<Option<PathBuf>> {
        Ok(self.ask(question)?.map(PathBuf::from))
    }
}

impl<R: BufRead, W: Write> InputPrompt for TerminalPrompt<R, W> {
    fn parallel_limit(&mut self) -> io::Result<Option<NonZeroUsize>> {
        loop {
            let Some(answer) = self.ask("Number of volumes to process in parallel")? else {
                return Ok(None);
            };
            match answer.parse::<NonZeroUsize>() {
                Ok(limit) => return Ok(Some(limit)),
                Err(_) => writeln!(self.output, "please enter a whole number of at least 1")?,
            }
        }
    }

    fn template(&mut self) -> io::Result<Option<PathBuf>> {
        self.ask_path("Template volume file")
    }

    fn directory(&mut self) -> io::Result<Option<PathBuf>> {
        self.ask_path("Directory containing the volumes")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn retries_until_a_valid_limit() {
        let mut output = Vec::new();
        let mut prompt = TerminalPrompt::new(Cursor::new("zero\n0\n4\n"), &mut output);
        assert_eq!(prompt.parallel_limit().unwrap(), NonZeroUsize::new(4));
        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(transcript.matches("at least 1").count(), 2);
    }

    #[test]
    fn blank_answers_and_eof_decline() {
        let mut prompt = TerminalPrompt::new(Cursor::new("  \n"), Vec::new());
        assert_eq!(prompt.template().unwrap(), None);
        assert_eq!(prompt.directory().unwrap(), None);
        assert_eq!(prompt.parallel_limit().unwrap(), None);
    }

    #[test]
    fn paths_are_trimmed() {
        let mut prompt = TerminalPrompt::new(Cursor::new(" /data/atlas.nrrd \n"), Vec::new());
        assert_eq!(
            prompt.template().unwrap(),
            Some(PathBuf::from("/data/atlas.nrrd"))
        );
    }
}
