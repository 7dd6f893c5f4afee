use std::fmt::Write;

use ansi_term::{Colour, Style};

use crate::{
    platform::Platform,
    tracker::{session::Phase, snapshot::TrackerView},
    utils::format::format_duration,
};

pub fn platform_style(platform: Platform) -> Style {
    match platform {
        Platform::Instagram => Colour::RGB(225, 48, 108).bold(),
        Platform::Twitter => Colour::White.bold(),
        Platform::Youtube => Colour::Red.bold(),
    }
}

fn paint(platform: Platform, text: &str, colour: bool) -> String {
    if colour {
        platform_style(platform).paint(text).to_string()
    } else {
        text.to_owned()
    }
}

/// Current session line, today's totals and the last redirect problem if there is one.
pub fn render_view(view: &TrackerView, colour: bool) -> String {
    let mut out = String::new();

    match view.active_platform {
        Some(platform) => {
            let state = match view.phase {
                Phase::Running => "running",
                Phase::Paused => "paused",
                Phase::Idle => "idle",
            };
            let _ = writeln!(
                out,
                "{} {} ({state})",
                paint(platform, platform.name(), colour),
                format_duration(view.current_elapsed)
            );
        }
        None => {
            let _ = writeln!(out, "No session. Type `start <platform>` to begin");
        }
    }

    let _ = writeln!(out, "Today's usage");
    for platform in Platform::ALL {
        let name = format!("{:<10}", platform.name());
        let _ = writeln!(
            out,
            "  {}{}",
            paint(platform, &name, colour),
            format_duration(view.daily_total(platform))
        );
    }

    if let Some(problem) = &view.redirect_problem {
        let _ = writeln!(out, "Redirect problem: {problem}");
    }
    out
}
