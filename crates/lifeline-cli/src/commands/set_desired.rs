use super::{json_pretty, Session, Target, EXIT_SUCCESS};
use lifeline_core::validate_desired_transition;
use lifeline_schema::State;
use tracing::warn;

pub fn run(
    session: &Session,
    target: &str,
    desired: &str,
    force: bool,
    json: bool,
) -> Result<u8, String> {
    let target = Target::parse(target)?;
    let desired = desired.parse::<State>().map_err(|e| e.to_string())?;

    let _lock = session.lock()?;
    let cluster = session.load()?;
    let sch = target.resolve_persisted(&cluster)?;
    let current = sch.state();
    if force {
        warn!("forcing desired state of {target} to {desired} (current {current})");
    } else {
        validate_desired_transition(current, desired).map_err(|e| e.to_string())?;
    }
    let previous = sch.desired_state();
    sch.set_desired_state(desired).map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::json!({
            "target": target.to_string(),
            "current": current,
            "previous_desired": previous,
            "desired": desired,
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{target}: desired {previous} -> {desired} (current {current})");
    }
    Ok(EXIT_SUCCESS)
}
