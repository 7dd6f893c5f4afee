use std::str::FromStr;

use anyhow::{anyhow, Result};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{platform::Platform, tracker::service::TrackerHandle};

use super::render::render_view;

const HELP: &str = "\
start <platform>   start timing instagram, x or youtube
pause              pause the running session
resume             resume and reopen the platform
end                end the session
foreground         report coming back from the platform
shortcut <type>    start the session of a launch shortcut
status             show the session and today's usage
clear              dismiss the redirect problem
quit               stop tracking and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(Platform),
    Pause,
    Resume,
    End,
    Foreground,
    Shortcut(String),
    Status,
    Clear,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("Empty command"))?;
        let argument = words.next();

        Ok(match (command.to_lowercase().as_str(), argument) {
            ("start", Some(platform)) => ConsoleCommand::Start(platform.parse()?),
            ("start", None) => return Err(anyhow!("Which platform? Try `start youtube`")),
            ("pause", _) => ConsoleCommand::Pause,
            ("resume", _) => ConsoleCommand::Resume,
            ("end" | "stop", _) => ConsoleCommand::End,
            ("foreground" | "back", _) => ConsoleCommand::Foreground,
            ("shortcut", Some(shortcut)) => ConsoleCommand::Shortcut(shortcut.to_owned()),
            ("status", _) => ConsoleCommand::Status,
            ("clear", _) => ConsoleCommand::Clear,
            ("help" | "?", _) => ConsoleCommand::Help,
            ("quit" | "exit", _) => ConsoleCommand::Quit,
            (other, _) => return Err(anyhow!("Unknown command {other}. Type `help`")),
        })
    }
}

/// Reads commands from stdin and forwards them to the tracker until `quit`, end of input or
/// cancellation. Redirect problems are printed as soon as the tracker publishes them.
pub async fn run_console(handle: TrackerHandle, shutdown: CancellationToken) -> Result<()> {
    let mut lines = LinesStream::new(BufReader::new(stdin()).lines());
    let mut view = handle.subscribe();
    let mut shown_problem: Option<String> = None;

    println!("{HELP}");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let problem = view.borrow_and_update().redirect_problem.clone();
                if problem.is_some() && problem != shown_problem {
                    if let Some(problem) = &problem {
                        println!("! {problem}");
                    }
                }
                shown_problem = problem;
            }
            line = lines.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!("Failed to read console input {e:?}");
                        break;
                    }
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => execute(&handle, command).await?,
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    debug!("Console closed");
    // Stops the tracker and the shutdown listener alike
    shutdown.cancel();
    Ok(())
}

async fn execute(handle: &TrackerHandle, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Start(platform) => handle.start_session(platform)?,
        ConsoleCommand::Pause => handle.pause_session()?,
        ConsoleCommand::Resume => handle.resume_session()?,
        ConsoleCommand::End => handle.end_current_session()?,
        ConsoleCommand::Foreground => handle.app_foregrounded()?,
        ConsoleCommand::Shortcut(shortcut) => match handle.launch_shortcut(&shortcut) {
            Ok(platform) => println!("Started {platform}"),
            Err(e) => println!("{e}"),
        },
        ConsoleCommand::Status => {
            let view = handle.view().await?;
            print!("{}", render_view(&view, true));
        }
        ConsoleCommand::Clear => handle.clear_redirect_problem()?,
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => (),
    }
    Ok(())
}
