//! Channel selection on the terminal.

use std::cell::RefCell;
use std::io::{BufRead, Write};

use petmux_core::multiplex::{Channel, ChannelAssignment};
use petmux_core::CoreError;
use petmux_pipeline::{ChannelChooser, PipelineError, Result};

/// Asks for the colour of every aligned tracer.
pub struct InteractiveChooser<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> InteractiveChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn prompt(&self, text: &str) -> Result<Option<String>> {
        let mut output = self.output.borrow_mut();
        write!(output, "{text}")
            .and_then(|_| output.flush())
            .map_err(|e| PipelineError::io("<stdout>", e))?;

        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .map_err(|e| PipelineError::io("<stdin>", e))?;
        Ok((read > 0).then(|| line.trim().to_string()))
    }

    fn say(&self, text: &str) {
        let _ = writeln!(self.output.borrow_mut(), "{text}");
    }
}

impl<R: BufRead, W: Write> ChannelChooser for InteractiveChooser<R, W> {
    fn choose(&self, tracers: &[String]) -> Result<ChannelAssignment> {
        if tracers.is_empty() || tracers.len() > Channel::ALL.len() {
            return Err(CoreError::ChannelCount(tracers.len()).into());
        }

        let mut entries: Vec<(String, Channel)> = Vec::with_capacity(tracers.len());
        for tracer in tracers {
            loop {
                let answer = self
                    .prompt(&format!("Channel for {tracer} [red/green/blue]: "))?
                    .ok_or_else(|| PipelineError::configuration("input ended before every tracer had a channel"))?;
                match answer.parse::<Channel>() {
                    Ok(channel) if entries.iter().any(|(_, used)| *used == channel) => {
                        self.say(&format!("{channel} is already taken"));
                    }
                    Ok(channel) => {
                        entries.push((tracer.clone(), channel));
                        break;
                    }
                    Err(err) => self.say(&err.to_string()),
                }
            }
        }
        Ok(ChannelAssignment::new(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tracers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reprompts_until_valid() {
        let input = Cursor::new("purple\nb\nblue\nR\n");
        let chooser = InteractiveChooser::new(input, Vec::new());
        let assignment = chooser.choose(&tracers(&["FDG", "PSMA"])).unwrap();

        assert_eq!(assignment.channel_of("FDG"), Some(Channel::Blue));
        assert_eq!(assignment.channel_of("PSMA"), Some(Channel::Red));
        let transcript = String::from_utf8(chooser.output.into_inner()).unwrap();
        assert!(transcript.contains("Unknown channel 'purple'"));
        assert!(transcript.contains("blue is already taken"));
    }

    #[test]
    fn test_end_of_input_fails() {
        let chooser = InteractiveChooser::new(Cursor::new("green\n"), Vec::new());
        assert!(matches!(
            chooser.choose(&tracers(&["FDG", "PSMA"])),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_four_tracers_are_refused_without_prompting() {
        let chooser = InteractiveChooser::new(Cursor::new(""), Vec::new());
        assert!(matches!(
            chooser.choose(&tracers(&["A", "B", "C", "D"])),
            Err(PipelineError::Core(CoreError::ChannelCount(4)))
        ));
        assert!(chooser.output.into_inner().is_empty());
    }
}
