//! Container port inference from a Dockerfile.
//!
//! When the caller does not name a port explicitly, the deployer reads the
//! project's Dockerfile and takes the single `EXPOSE`d port. Zero or more
//! than one exposed port is a hard error, not a guess.

use std::path::Path;

use super::error::DeployError;

/// Infer the container port from the Dockerfile at `path`.
///
/// Exactly one exposed port is required. `EXPOSE 8080 9090` or two
/// separate `EXPOSE` lines both count as ambiguous.
pub async fn exposed_port(path: &Path) -> Result<u16, DeployError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        DeployError::Configuration(format!("Could not read {}: {}", path.display(), e))
    })?;

    let ports = parse_exposed_ports(&contents).map_err(|token| {
        DeployError::Configuration(format!(
            "Cannot resolve EXPOSE value '{}' in {}",
            token,
            path.display()
        ))
    })?;

    match ports.as_slice() {
        [] => Err(DeployError::MissingPort {
            path: path.to_path_buf(),
        }),
        [port] => Ok(*port),
        _ => Err(DeployError::AmbiguousPort {
            count: ports.len(),
            path: path.to_path_buf(),
        }),
    }
}

/// Collect every port declared by an `EXPOSE` instruction, in order.
///
/// Protocol suffixes (`8080/tcp`) are stripped. A value that is not a
/// literal port number (`EXPOSE $PORT`) is returned as the error.
fn parse_exposed_ports(contents: &str) -> Result<Vec<u16>, String> {
    let mut ports = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(keyword) if keyword.eq_ignore_ascii_case("EXPOSE") => {}
            _ => continue,
        }

        for token in tokens {
            let value = token.split('/').next().unwrap_or(token);
            let port: u16 = value.parse().map_err(|_| token.to_string())?;
            ports.push(port);
        }
    }

    Ok(ports)
}
