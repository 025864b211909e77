use super::{colorize_state, json_pretty, Session, Target, EXIT_SUCCESS};
use lifeline_core::{HostComponentResponse, OpTimes, NEVER};
use lifeline_schema::ConfigVersions;
use serde::Serialize;

#[derive(Serialize)]
struct InspectView {
    #[serde(flatten)]
    response: HostComponentResponse,
    persisted: bool,
    client_only: bool,
    effective_desired_configs: ConfigVersions,
    op_times: OpTimes,
}

fn format_time(ms: i64) -> String {
    if ms == NEVER {
        "never".to_owned()
    } else {
        ms.to_string()
    }
}

fn format_configs(configs: &ConfigVersions) -> String {
    if configs.is_empty() {
        return "(none)".to_owned();
    }
    configs
        .iter()
        .map(|(t, v)| format!("{t}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn run(session: &Session, target: &str, json: bool) -> Result<u8, String> {
    let target = Target::parse(target)?;
    let cluster = session.load()?;
    let sch = target.resolve(&cluster)?;
    let view = InspectView {
        response: sch.to_response(),
        persisted: sch.is_persisted(),
        client_only: sch.is_client_component(),
        effective_desired_configs: sch.desired_configs(),
        op_times: sch.last_op_times(),
    };

    if json {
        println!("{}", json_pretty(&view)?);
        return Ok(EXIT_SUCCESS);
    }

    let r = &view.response;
    println!("target:           {target}");
    println!("cluster:          {}", r.cluster_name);
    println!("persisted:        {}", view.persisted);
    println!("client_only:      {}", view.client_only);
    println!("state:            {}", colorize_state(&r.live_state));
    println!("desired_state:    {}", r.desired_state);
    println!("stack:            {}", r.stack_version);
    println!("desired_stack:    {}", r.desired_stack_version);
    println!("live_configs:     {}", format_configs(&r.live_configs));
    println!(
        "desired_configs:  {}",
        format_configs(&view.effective_desired_configs)
    );
    println!("stale_configs:    {}", r.stale_configs);
    println!("last_op_start:    {}", format_time(view.op_times.last_op_start));
    println!("last_op_end:      {}", format_time(view.op_times.last_op_end));
    println!(
        "last_op_update:   {}",
        format_time(view.op_times.last_op_last_update)
    );
    Ok(EXIT_SUCCESS)
}
