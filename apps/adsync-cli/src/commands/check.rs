//! `adsync check` - validate configuration and probe directories.

use std::path::PathBuf;

use clap::Args;

use adsync_connector_ldap::LdapDirectory;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Only validate the file, skip connecting to the directories
    #[arg(long)]
    pub offline: bool,
}

pub async fn execute(args: CheckArgs) -> CliResult<()> {
    let config = AppConfig::load(&args.config)?;
    config.validate()?;

    eprintln!(
        "configuration ok: {} poller(s) defined",
        config.pollers.len()
    );

    if args.offline {
        return Ok(());
    }

    let mut failed = 0;
    for entry in &config.pollers {
        let name = &entry.poller.name;
        match probe(entry).await {
            Ok(summary) => eprintln!("{name}: {summary}"),
            Err(e) => {
                failed += 1;
                eprintln!("{name}: unreachable - {e}");
            }
        }
    }

    if failed > 0 {
        return Err(CliError::RunFailed {
            failed,
            total: config.pollers.len(),
        });
    }
    Ok(())
}

async fn probe(entry: &crate::config::PollerEntry) -> CliResult<String> {
    let directory = LdapDirectory::new(entry.ldap.clone())?;
    let info = directory.server_info().await?;

    let mut parts = vec!["bind ok".to_string()];
    if let Some(host) = info.dns_host_name {
        parts.push(format!("dc {host}"));
    }
    if let Some(usn) = info.highest_committed_usn {
        parts.push(format!("highest committed usn {usn}"));
    }
    Ok(parts.join(", "))
}
