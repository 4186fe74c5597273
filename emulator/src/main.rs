mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use session::Session;

const USAGE: &str = "usage: signal-emulator [--transcript <path>]";

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run { transcript: Option<PathBuf> },
    Usage,
}

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Entry<'a> {
    Command(&'a str),
    Blank,
    Leave,
}

fn main() -> ExitCode {
    let invocation = match parse_args(env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("signal-emulator: {message}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };
    let transcript = match invocation {
        Invocation::Run { transcript } => transcript,
        Invocation::Usage => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
    };

    match interact(transcript.as_deref(), io::stdin().lock(), io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("signal-emulator: {error}");
            ExitCode::FAILURE
        }
    }
}

fn interact(
    transcript: Option<&Path>,
    mut input: impl BufRead,
    mut output: impl Write,
) -> io::Result<()> {
    let mut session = Session::new(transcript)?;

    writeln!(output, "US-120 / Martin / Tech Parkway bench, simulated time.")?;
    writeln!(output, "`help` lists commands; `exit`, `quit` or end of input leaves.")?;
    for line in session.banner() {
        writeln!(output, "  {line}")?;
    }

    let mut buffer = String::new();
    loop {
        write!(output, "{}", session.prompt())?;
        output.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            writeln!(output)?;
            break;
        }
        match classify(&buffer) {
            Entry::Blank => {}
            Entry::Leave => break,
            Entry::Command(command) => {
                for line in session.handle_command(command)? {
                    writeln!(output, "{line}")?;
                }
            }
        }
    }

    writeln!(output, "bench closed at {}", session.clock_label())?;
    Ok(())
}

fn classify(line: &str) -> Entry<'_> {
    let line = line.trim();
    if line.is_empty() {
        Entry::Blank
    } else if ["exit", "quit"]
        .iter()
        .any(|word| line.eq_ignore_ascii_case(word))
    {
        Entry::Leave
    } else {
        Entry::Command(line)
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Invocation, String> {
    let mut transcript = None;
    while let Some(arg) = args.next() {
        let path = match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Usage),
            "--transcript" => args
                .next()
                .ok_or_else(|| "--transcript needs a path".to_string())?,
            other => match other.strip_prefix("--transcript=") {
                Some(path) => path.to_string(),
                None => return Err(format!("unrecognised argument `{other}`")),
            },
        };
        if path.is_empty() {
            return Err("--transcript needs a path".to_string());
        }
        if transcript.replace(PathBuf::from(path)).is_some() {
            return Err("--transcript given twice".to_string());
        }
    }
    Ok(Invocation::Run { transcript })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|arg| (*arg).to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn transcript_accepts_both_spellings() {
        let expected = Invocation::Run {
            transcript: Some(PathBuf::from("bench.log")),
        };
        assert_eq!(parse_args(args(&["--transcript", "bench.log"])), Ok(expected));
        let expected = Invocation::Run {
            transcript: Some(PathBuf::from("bench.log")),
        };
        assert_eq!(parse_args(args(&["--transcript=bench.log"])), Ok(expected));
        assert_eq!(parse_args(args(&[])), Ok(Invocation::Run { transcript: None }));
    }

    #[test]
    fn bad_arguments_are_refused() {
        assert!(parse_args(args(&["--transcript"])).is_err());
        assert!(parse_args(args(&["--transcript="])).is_err());
        assert!(parse_args(args(&["--transcript=a", "--transcript=b"])).is_err());
        assert!(parse_args(args(&["reboot"])).is_err());
        assert_eq!(parse_args(args(&["--help", "junk"])), Ok(Invocation::Usage));
    }

    #[test]
    fn leave_words_are_case_insensitive() {
        assert_eq!(classify("  QUIT \n"), Entry::Leave);
        assert_eq!(classify("exit"), Entry::Leave);
        assert_eq!(classify(" \n"), Entry::Blank);
        assert_eq!(classify("status\n"), Entry::Command("status"));
        assert_eq!(classify("exit now"), Entry::Command("exit now"));
    }

    #[test]
    fn quit_ends_a_scripted_session() {
        let script = b"sensor martin-stop on\n\nadvance 12s\nquit\nstatus\n";
        let mut output = Vec::new();
        interact(None, &script[..], &mut output).expect("session");

        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("OK martin-stop occupied"), "{text}");
        assert!(text.contains("OK t=12.000s"), "{text}");
        assert!(!text.contains("state="), "status ran after quit: {text}");
        assert!(text.ends_with("bench closed at [t=12.000s]\n"), "{text}");
    }
}
