use std::io::Write;

use opsy_core::{CommunicationReceivers, Message, Status};
use opsy_tools::ExecutedCommand;

/// Print bus events to stdout until the run reports a terminal status.
/// Returns that status, or `None` if the bus closed without one.
pub async fn drain(mut rx: CommunicationReceivers) -> Option<Status> {
    let mut out = std::io::stdout();
    loop {
        tokio::select! {
            Some(command) = rx.commands.recv() => print_command(&mut out, &command),
            Some(message) = rx.messages.recv() => print_message(&mut out, &message),
            status = rx.status.recv() => match status {
                Some(status) if status.is_terminal() => {
                    // Everything published before the status is already queued.
                    while let Ok(message) = rx.messages.try_recv() {
                        print_message(&mut out, &message);
                    }
                    while let Ok(command) = rx.commands.try_recv() {
                        print_command(&mut out, &command);
                    }
                    return Some(status);
                }
                Some(status) => tracing::debug!(%status, "run status"),
                None => return None,
            },
        }
    }
}

fn print_message(out: &mut impl Write, message: &Message) {
    let time = message.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    let _ = match &message.tool {
        Some(tool) => writeln!(out, "[{time}] {tool}: {}", message.message),
        None => writeln!(out, "[{time}] {}", message.message),
    };
}

fn print_command(out: &mut impl Write, command: &ExecutedCommand) {
    let elapsed = command
        .duration()
        .map(|d| format!(", {:.1}s", d.num_milliseconds() as f64 / 1000.0))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "  $ {}  (in {}, exit {}{elapsed})",
        command.command, command.working_directory, command.exit_code
    );
    for line in command.output.lines() {
        let _ = writeln!(out, "    {line}");
    }
}
