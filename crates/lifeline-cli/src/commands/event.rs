use super::{colorize_state, json_pretty, Session, Target, EXIT_SUCCESS};
use lifeline_schema::{parse_config_pairs, EventKind, EventPayload, HostComponentEvent, StackId};

/// Arguments of one `lifeline event` invocation.
pub struct EventArgs<'a> {
    pub target: &'a str,
    pub kind: &'a str,
    pub stack: Option<&'a str>,
    pub configs: &'a [String],
    pub timestamp: Option<i64>,
}

fn build_event(target: &Target, args: &EventArgs<'_>) -> Result<HostComponentEvent, String> {
    let kind = args.kind.parse::<EventKind>().map_err(|e| e.to_string())?;
    let ts = args
        .timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    let payload = match kind {
        EventKind::Install => {
            let stack = args
                .stack
                .ok_or("INSTALL events need --stack <NAME-VERSION>")?;
            let stack_id = stack.parse::<StackId>().map_err(|e| e.to_string())?;
            EventPayload::Install { stack_id }
        }
        EventKind::Start => EventPayload::Start {
            configs: parse_config_pairs(args.configs).map_err(|e| e.to_string())?,
        },
        other => {
            if args.stack.is_some() || !args.configs.is_empty() {
                return Err(format!(
                    "{other} events take neither --stack nor --config"
                ));
            }
            EventPayload::bare(other).map_err(|e| e.to_string())?
        }
    };
    Ok(HostComponentEvent::new(
        target.component.as_str(),
        target.host.as_str(),
        ts,
        payload,
    ))
}

pub fn run(session: &Session, args: &EventArgs<'_>, json: bool) -> Result<u8, String> {
    let target = Target::parse(args.target)?;
    let event = build_event(&target, args)?;

    let _lock = session.lock()?;
    let cluster = session.load()?;
    let sch = target.resolve_persisted(&cluster)?;
    let from = sch.state();
    let to = sch.handle_event(&event).map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::json!({
            "target": target.to_string(),
            "event": event.kind(),
            "timestamp": event.op_timestamp,
            "from": from,
            "to": to,
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!(
            "{target}: {} --{}--> {}",
            from,
            event.kind(),
            colorize_state(to.as_str())
        );
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(kind: &'a str, stack: Option<&'a str>, configs: &'a [String]) -> EventArgs<'a> {
        EventArgs {
            target: "HDFS/DATANODE@h1",
            kind,
            stack,
            configs,
            timestamp: Some(42),
        }
    }

    fn target() -> Target {
        Target::parse("HDFS/DATANODE@h1").unwrap()
    }

    #[test]
    fn install_requires_stack() {
        let err = build_event(&target(), &args("install", None, &[])).unwrap_err();
        assert!(err.contains("--stack"));
        let event = build_event(&target(), &args("INSTALL", Some("HDP-2.0"), &[])).unwrap();
        assert_eq!(event.kind(), EventKind::Install);
        assert_eq!(event.op_timestamp, 42);
    }

    #[test]
    fn start_collects_configs() {
        let configs = vec!["core-site=v2".to_owned()];
        let event = build_event(&target(), &args("start", None, &configs)).unwrap();
        match event.payload {
            EventPayload::Start { configs } => assert_eq!(configs["core-site"], "v2"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn bare_event_rejects_payload_flags() {
        let err = build_event(&target(), &args("stop", Some("HDP-2.0"), &[])).unwrap_err();
        assert!(err.contains("neither"));
        let event = build_event(&target(), &args("op-succeeded", None, &[])).unwrap();
        assert_eq!(event.kind(), EventKind::OpSucceeded);
        assert_eq!(event.host_name.as_str(), "h1");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(build_event(&target(), &args("explode", None, &[])).is_err());
    }
}
