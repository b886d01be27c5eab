//! Interactive Terminal Chat
//!
//! The readline loop that connects a caller at a terminal to the
//! conversation engine. The loop owns presentation only: colors, the
//! banner, quit words, and the closing footers. All conversation decisions
//! happen inside [`Teller::process_turn`].

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use teller_core::session::{Session, SessionState, Teller};
use tracing::info;

const EXIT_WORDS: &[&str] = &["quit", "exit", "bye"];

/// Whether the caller asked to leave rather than talk.
fn wants_to_quit(line: &str) -> bool {
    EXIT_WORDS.contains(&line.to_lowercase().as_str())
}

/// The note printed under the last reply when a session closes.
fn closing_footer(state: SessionState) -> Option<&'static str> {
    match state {
        SessionState::Success => Some("[Account balance retrieved successfully]"),
        SessionState::Terminal => Some("[Session ended]"),
        _ => None,
    }
}

/// Runs the chat loop until the session closes or the caller quits.
pub async fn run(teller: &Teller, session: &mut Session) -> anyhow::Result<()> {
    if let Some(reply) = session.state().closed_reply() {
        println!("{}", reply);
        return Ok(());
    }

    let mut editor = DefaultEditor::new()?;

    println!(
        "{}",
        "=== Teller Banking Assistant ===".bright_magenta().bold()
    );
    println!("I can help you check your account balance.");
    println!("{}", "Type 'quit' to exit.".bright_black());
    println!();

    loop {
        match editor.readline("You: ") {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed.is_empty() {
                    continue;
                }

                if wants_to_quit(trimmed) {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                let _ = editor.add_history_entry(&line);

                let reply = teller.process_turn(session, trimmed).await?;
                println!("\nAssistant: {}\n", reply.bright_blue());

                if let Some(footer) = closing_footer(session.state()) {
                    println!("{}", footer.bright_black());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    info!(session_id = %session.id(), state = %session.state(), "chat loop finished");
    Ok(())
}
