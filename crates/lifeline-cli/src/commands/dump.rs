use super::{json_pretty, Session, EXIT_SUCCESS};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let cluster = session.load()?;
    let mut out = String::new();
    cluster.debug_dump(&mut out);
    if json {
        let lines: Vec<&str> = out.lines().collect();
        println!("{}", json_pretty(&lines)?);
    } else {
        println!("{out}");
    }
    Ok(EXIT_SUCCESS)
}
