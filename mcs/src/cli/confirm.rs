//! Interactive confirmation for destructive commands
//!
//! Confirmation is read from the controlling terminal, not stdin, so piped
//! input can never answer a prompt. Without a terminal the answer is "no".

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use tracing::warn;

/// A prompt source paired with somewhere to print the question
pub struct Confirmation<R, W> {
    input: R,
    output: W,
}

impl Confirmation<BufReader<File>, File> {
    /// Open the controlling terminal, if there is one
    pub fn acquire() -> Option<Self> {
        let input = File::open("/dev/tty").ok()?;
        let output = OpenOptions::new().write(true).open("/dev/tty").ok()?;
        Some(Self::new(BufReader::new(input), output))
    }
}

impl<R: BufRead, W: Write> Confirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask a yes/no question; anything but `y`/`yes` declines
    pub fn ask(&mut self, prompt: &str) -> bool {
        if write!(self.output, "{} [y/N]: ", prompt)
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }

        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        }
    }
}

/// Confirm a destructive action, failing closed without a terminal
pub fn confirm(prompt: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    match Confirmation::<BufReader<File>, File>::acquire() {
        Some(mut confirmation) => confirmation.ask(prompt),
        None => {
            warn!("No terminal available to confirm \"{}\"; treating as declined", prompt);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let answer =
            Confirmation::new(Cursor::new(input.as_bytes()), &mut output).ask("Remove acme-web?");
        (answer, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_accepts_yes() {
        assert!(ask("y\n").0);
        assert!(ask("YES\n").0);
        assert!(ask("  yes  \n").0);
    }

    #[test]
    fn test_declines_everything_else() {
        assert!(!ask("n\n").0);
        assert!(!ask("\n").0);
        assert!(!ask("yep\n").0);
        assert!(!ask("").0);
    }

    #[test]
    fn test_prompt_written() {
        let (_, output) = ask("n\n");
        assert_eq!(output, "Remove acme-web? [y/N]: ");
    }

    #[test]
    fn test_assume_yes_skips_terminal() {
        assert!(confirm("Destroy everything?", true));
    }
}
