use crate::model::Host;

/// Connected hosts whose reported version differs from `version`.
pub fn hosts_needing_update<'a>(hosts: &'a [Host], version: &str) -> Vec<&'a Host> {
    hosts
        .iter()
        .filter(|h| h.connected && h.version != version)
        .collect()
}
