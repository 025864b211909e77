use super::{colorize_state, json_pretty, Session, EXIT_SUCCESS};
use lifeline_core::HostComponentResponse;
use serde::Serialize;

#[derive(Serialize)]
struct ListEntry {
    #[serde(flatten)]
    response: HostComponentResponse,
    persisted: bool,
}

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let cluster = session.load()?;
    let entries: Vec<ListEntry> = cluster
        .host_components()
        .iter()
        .map(|sch| ListEntry {
            response: sch.to_response(),
            persisted: sch.is_persisted(),
        })
        .collect();

    if json {
        println!("{}", json_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("no host components found");
    } else {
        println!(
            "{:<12} {:<20} {:<20} {:<16} {:<12} {:<6} STACK",
            "SERVICE", "COMPONENT", "HOST", "STATE", "DESIRED", "STALE"
        );
        for entry in &entries {
            let r = &entry.response;
            let state = if entry.persisted {
                colorize_state(&r.live_state)
            } else {
                format!("{} (new)", r.live_state)
            };
            println!(
                "{:<12} {:<20} {:<20} {:<16} {:<12} {:<6} {}",
                r.service_name,
                r.component_name,
                r.host_name,
                state,
                r.desired_state,
                if r.stale_configs { "yes" } else { "no" },
                r.stack_version
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
