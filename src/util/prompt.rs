//! Interactive yes/no confirmation.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Something that can answer a yes/no question.
pub trait Confirm {
    /// Ask `question`; `true` means go ahead.
    fn confirm(&mut self, question: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, question: &str) -> bool {
        self(question)
    }
}

/// Set while a [`StdinConfirm`] waits for an answer.
static PROMPTING: AtomicBool = AtomicBool::new(false);

/// Set by [`interrupt_prompt`], cleared when the next prompt starts.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Record a Ctrl-C for the prompt currently waiting, if any.
///
/// Returns `false` when no prompt is waiting; the caller decides how to
/// stop the process then.
pub fn interrupt_prompt() -> bool {
    if PROMPTING.load(Ordering::SeqCst) {
        INTERRUPTED.store(true, Ordering::SeqCst);
        true
    } else {
        false
    }
}

/// Asks on stderr and reads the answer from stdin.
///
/// Lines are read on a background thread so an interrupted prompt can
/// return without waiting for input. A line typed after the interrupt
/// answers the next question.
#[derive(Debug)]
pub struct StdinConfirm {
    lines: Receiver<String>,
}

impl StdinConfirm {
    pub fn new() -> Self {
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        StdinConfirm { lines }
    }
}

impl Default for StdinConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        INTERRUPTED.store(false, Ordering::SeqCst);
        PROMPTING.store(true, Ordering::SeqCst);
        let answer = ask_until_interrupted(&self.lines, &INTERRUPTED, &mut io::stderr(), question);
        PROMPTING.store(false, Ordering::SeqCst);
        if INTERRUPTED.swap(false, Ordering::SeqCst) {
            eprintln!();
        }
        answer
    }
}

/// Prompt with answers taken from `lines`. An interrupt or a closed
/// channel is "no".
fn ask_until_interrupted<W: Write>(
    lines: &Receiver<String>,
    interrupted: &AtomicBool,
    output: &mut W,
    question: &str,
) -> bool {
    prompt_loop(output, question, || loop {
        if interrupted.load(Ordering::SeqCst) {
            return None;
        }
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => return Some(line),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    })
}

/// Parse one answer. `None` means the answer was not understood.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "ye" | "yes" => Some(true),
        "n" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Prompt until a yes/no answer arrives. End of input or a read error is "no".
pub fn ask_yes_no<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> bool {
    prompt_loop(output, question, || {
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    })
}

fn prompt_loop<W: Write>(
    output: &mut W,
    question: &str,
    mut next_line: impl FnMut() -> Option<String>,
) -> bool {
    let _ = write!(output, "{} [y/N]: ", question);
    let _ = output.flush();

    loop {
        let Some(line) = next_line() else {
            return false;
        };

        if let Some(answer) = parse_answer(&line) {
            return answer;
        }

        let _ = write!(output, "Please respond with 'yes' or 'no' [y/N]: ");
        let _ = output.flush();
    }
}
