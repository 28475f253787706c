//! `lllm replay`: Print everything a logged session recorded.

use std::path::Path;

use lllm_log::{Activity, ActivityKind, LogType, ReplaySession};

pub fn run(config_path: Option<&Path>, session: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    if config.log_type != LogType::LocalFile {
        return Err(format!("Replay needs log_type = \"localfile\" (configured: {:?})", config.log_type).into());
    }
    let log_base = lllm_log::build_log_base(config.log_type, &config.resolved_log_dir(), &config.log_base_name())?;
    let replay = ReplaySession::load(log_base.as_ref(), session)?;

    if replay.dialogs.is_empty() && replay.frontend.is_empty() {
        return Err(format!("No records for session '{session}'").into());
    }
    println!("Session {session}: {} dialog(s)", replay.dialogs.len());
    for activity in replay.activities() {
        println!("{}", render(&replay, &activity));
    }
    Ok(())
}

fn render(replay: &ReplaySession, activity: &Activity) -> String {
    let at = activity.timestamp.format("%H:%M:%S%.3f");
    match &activity.kind {
        ActivityKind::Message { dialog_id } => {
            let role = activity
                .metadata
                .get("role")
                .and_then(|r| r.as_str())
                .unwrap_or("?");
            let fork = match replay.parent_of(dialog_id) {
                Some(parent) => format!(" (fork of {})", short(parent)),
                None => String::new(),
            };
            format!("[{at}] {}{fork} {role}: {}", short(dialog_id), activity.value)
        }
        ActivityKind::Frontend => format!("[{at}] frontend: {}", activity.value),
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
