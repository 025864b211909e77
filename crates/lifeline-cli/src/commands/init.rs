use super::{json_pretty, Session, EXIT_SUCCESS};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let _lock = session.lock()?;
    let cluster = session.load()?;
    let created = cluster.persist_all().map_err(|e| e.to_string())?;
    let total = cluster.host_components().len();

    if json {
        let out = serde_json::json!({
            "cluster": cluster.name(),
            "cluster_id": cluster.id(),
            "created": created,
            "total": total,
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!(
            "initialized cluster '{}' in {}: {created} new, {} existing host components",
            cluster.name(),
            session.store_path().display(),
            total - created
        );
    }
    Ok(EXIT_SUCCESS)
}
