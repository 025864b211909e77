use super::{colorize_state, json_pretty, Session, Target, EXIT_SUCCESS};
use lifeline_core::validate_transition;
use lifeline_schema::State;
use tracing::warn;

/// Assign the current state directly. The change must be a legal
/// predecessor/successor pair unless `force` is set.
pub fn run(
    session: &Session,
    target: &str,
    state: &str,
    force: bool,
    json: bool,
) -> Result<u8, String> {
    let target = Target::parse(target)?;
    let state = state.parse::<State>().map_err(|e| e.to_string())?;

    let _lock = session.lock()?;
    let cluster = session.load()?;
    let sch = target.resolve_persisted(&cluster)?;
    let from = sch.state();
    if force {
        warn!("forcing {target} from {from} to {state}");
    } else {
        validate_transition(from, state).map_err(|e| e.to_string())?;
    }
    sch.set_state(state).map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::json!({
            "target": target.to_string(),
            "from": from,
            "to": state,
            "forced": force,
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{target}: {from} -> {}", colorize_state(state.as_str()));
    }
    Ok(EXIT_SUCCESS)
}
