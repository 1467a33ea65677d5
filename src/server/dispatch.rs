//! Maps decoded requests onto pool and database operations.
//!
//! Every command acquires its database's lock once, for its full duration;
//! commands on the same database serialize, different databases proceed
//! independently. Non-fatal failures become sentinel responses; corruption
//! propagates so the serving loop can fail-stop.

use tracing::{error, warn};

use crate::db::{Database, DatabasePool};
use crate::error::{Result, StoreError};
use crate::journal::codec;
use crate::server::protocol::{
    self, Request, SENTINEL_MALFORMED, SENTINEL_NO_RESULT, SENTINEL_PARSE_FAULT,
};

/// Reply to the connection-test operation.
pub const GREETING: &str = "Hello Cranjis!";

const UNKNOWN_COMMAND: &str = "Unknown command.";

/// Handle one frame payload end to end, returning the response bytes.
///
/// `Err` is reserved for fatal conditions; everything else — bad requests,
/// unknown names, I/O trouble — is answered with a sentinel.
pub fn handle_payload(pool: &DatabasePool, payload: &str) -> Result<String> {
    let request = match protocol::parse_request(payload) {
        Ok(request) => request,
        Err(StoreError::ParseFault(reason)) => {
            warn!(%reason, "undecodable request");
            return Ok(SENTINEL_PARSE_FAULT.to_string());
        }
        Err(err) => {
            warn!(%err, "rejected request");
            return Ok(SENTINEL_MALFORMED.to_string());
        }
    };

    let handle = match pool.use_database(&request.database) {
        Ok((handle, _)) => handle,
        Err(err) if err.is_fatal() => return Err(err),
        Err(err) => {
            warn!(database = %request.database, %err, "cannot use database");
            return Ok(SENTINEL_MALFORMED.to_string());
        }
    };

    let mut database = handle.lock();
    match run_operation(pool, &mut database, &request) {
        Ok(reply) => Ok(reply),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            error!(operation = %request.operation, %err, "command failed");
            Ok(SENTINEL_MALFORMED.to_string())
        }
    }
}

fn run_operation(pool: &DatabasePool, db: &mut Database, request: &Request) -> Result<String> {
    let args = &request.args;
    let reply = match request.operation.as_str() {
        "GET" | "LS" => {
            let result = db.get(args)?;
            if result.values.is_empty() {
                SENTINEL_NO_RESULT.to_string()
            } else {
                let escaped: Vec<String> = result
                    .values
                    .iter()
                    .map(|value| codec::display_escape(value))
                    .collect();
                escaped.join("\n")
            }
        }
        "SET" => db.set(args)?.to_string(),
        "IS" => i64::from(db.is(args)?).to_string(),
        "DEL" => db.del(args)?.to_string(),
        "UPD" => match split_update_args(args) {
            Some((path, replacement)) => db.update(&path, &replacement)?.to_string(),
            None => SENTINEL_MALFORMED.to_string(),
        },
        "DROP" => db.drop_all()?.to_string(),
        "TREE" | "TRE" => db.tree(args, false)?,
        "TREEN" | "TREN" => db.tree(args, true)?,
        "COUNT" => db.count(args)?.to_string(),
        "USE" => {
            if args.len() != 1 {
                SENTINEL_MALFORMED.to_string()
            } else {
                match pool.use_database(&args[0]) {
                    Ok((_, outcome)) => outcome.code().to_string(),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(StoreError::IllegalName(_)) => SENTINEL_MALFORMED.to_string(),
                    Err(err) => {
                        warn!(%err, "nested USE failed");
                        SENTINEL_PARSE_FAULT.to_string()
                    }
                }
            }
        }
        "COMPACT" => match db.compact() {
            Err(StoreError::Unsupported(what)) => {
                warn!(what, "compaction requested");
                SENTINEL_MALFORMED.to_string()
            }
            Err(err) => return Err(err),
            Ok(()) => "0".to_string(),
        },
        "DBLIST" => pool.list_names().join("\n"),
        "test" => GREETING.to_string(),
        _ => UNKNOWN_COMMAND.to_string(),
    };
    Ok(reply)
}

/// Split `UPD` arguments at the literal `:` token into (path, replacement);
/// a `\:` token stands for a literal `:` in either list.
fn split_update_args(args: &[String]) -> Option<(Vec<String>, Vec<String>)> {
    if args.len() < 3 {
        return None;
    }
    let mut path = Vec::new();
    let mut replacement = Vec::new();
    let mut before_separator = true;
    for arg in args {
        if arg == ":" {
            before_separator = false;
            continue;
        }
        let token = if arg == "\\:" { ":".to_string() } else { arg.clone() };
        if before_separator {
            path.push(token);
        } else {
            replacement.push(token);
        }
    }
    if path.is_empty() || replacement.is_empty() {
        return None;
    }
    Some((path, replacement))
}
