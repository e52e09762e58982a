use std::str::FromStr;

use super::{SessionStatus, TimerController, WorkoutSnapshot};

pub const COMMAND_HELP: &str =
    "Commands: start, pause, resume, stop, back, quit (Enter toggles start/pause/resume)";

/// A line typed in the workout view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutCommand {
    Toggle,
    Start,
    Pause,
    Resume,
    Stop,
    Back,
    Quit,
    Help,
}

impl FromStr for WorkoutCommand {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let command = match input.trim().to_ascii_lowercase().as_str() {
            "" => Self::Toggle,
            "start" | "s" => Self::Start,
            "pause" | "p" => Self::Pause,
            "resume" | "r" => Self::Resume,
            "stop" | "x" => Self::Stop,
            "back" | "b" => Self::Back,
            "quit" | "q" | "exit" => Self::Quit,
            "help" | "h" | "?" => Self::Help,
            other => return Err(format!("Unknown command '{other}'. {COMMAND_HELP}")),
        };
        Ok(command)
    }
}

/// What the workout view should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Updated(WorkoutSnapshot),
    /// Leave the workout view for the dashboard.
    Back,
    Quit,
    Help,
}

pub fn apply_command(controller: &TimerController, command: WorkoutCommand) -> CommandOutcome {
    match command {
        WorkoutCommand::Toggle => CommandOutcome::Updated(toggle(controller)),
        WorkoutCommand::Start => CommandOutcome::Updated(start_workout(controller)),
        WorkoutCommand::Pause => CommandOutcome::Updated(controller.pause()),
        WorkoutCommand::Resume => CommandOutcome::Updated(controller.resume()),
        WorkoutCommand::Stop => CommandOutcome::Updated(controller.stop()),
        WorkoutCommand::Back => {
            controller.unload();
            CommandOutcome::Back
        }
        WorkoutCommand::Quit => {
            controller.unload();
            CommandOutcome::Quit
        }
        WorkoutCommand::Help => CommandOutcome::Help,
    }
}

/// A finished workout goes back to "Ready to Start" before it can run again.
fn start_workout(controller: &TimerController) -> WorkoutSnapshot {
    if controller.status() == SessionStatus::Finished {
        if let Some(routine) = controller.routine() {
            controller.load(routine);
        }
    }
    controller.start()
}

fn toggle(controller: &TimerController) -> WorkoutSnapshot {
    match controller.status() {
        SessionStatus::Idle | SessionStatus::Finished => start_workout(controller),
        SessionStatus::Running => controller.pause(),
        SessionStatus::Paused => controller.resume(),
    }
}
