use super::{json_pretty, Session, Target, EXIT_SUCCESS};

pub fn run(session: &Session, target: &str, json: bool) -> Result<u8, String> {
    let target = Target::parse(target)?;
    let _lock = session.lock()?;
    let cluster = session.load()?;
    cluster
        .remove_host_component(&target.service, &target.component, &target.host)
        .map_err(|e| e.to_string())?;
    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({ "removed": target.to_string() }))?
        );
    } else {
        println!("removed {target}");
    }
    Ok(EXIT_SUCCESS)
}
