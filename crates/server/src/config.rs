use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use qdb_coordination::ConnectString;
use qdb_membership::{MembershipResolver, ServerIdentity};
use qdb_metadata::{RepositoryOptions, SessionOptions};
use tracing::Level;

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(version, about = "QDB queue server", long_about = None)]
pub struct Args {
    /// Address of this server, as named in the server list
    #[arg(long, env = "QDB_ADDRESS", default_value = "127.0.0.1:9554")]
    pub address: String,

    /// Comma-separated addresses of every server in the cluster; empty for a
    /// single-node cluster
    #[arg(long, env = "QDB_SERVERS", default_value = "")]
    pub servers: String,

    /// Coordination service ensemble, `host:port[,host:port...][/chroot]`
    #[arg(long, env = "QDB_COORDINATION_CONNECT", default_value = "127.0.0.1:2181")]
    pub coordination_connect: String,

    /// Coordination session timeout in milliseconds
    #[arg(long, env = "QDB_SESSION_TIMEOUT_MS", default_value_t = 20_000)]
    pub session_timeout_ms: u64,

    /// Upper bound on a single metadata store call in milliseconds
    #[arg(long, env = "QDB_OPERATION_TIMEOUT_MS", default_value_t = 10_000)]
    pub operation_timeout_ms: u64,

    /// Name of the cluster
    #[arg(long, env = "QDB_CLUSTER_NAME", default_value = "default")]
    pub cluster_name: String,

    /// Password hash of the admin user created on first start
    #[arg(long, env = "QDB_INITIAL_ADMIN_PASSWORD_HASH", required = true)]
    pub initial_admin_password_hash: String,

    /// Directory for local data
    #[arg(long, env = "QDB_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Maximum log level
    #[arg(long, default_value = "info")]
    pub log_level: Level,
}

impl Args {
    /// Resolves the cluster membership for this server.
    pub fn membership(&self) -> Result<MembershipResolver> {
        let own_identity = ServerIdentity::parse(&self.address)?;
        Ok(MembershipResolver::resolve(own_identity, &self.servers)?)
    }

    /// Options for the metadata repository.
    pub fn repository_options(&self) -> Result<RepositoryOptions> {
        let connect_string = ConnectString::parse(&self.coordination_connect)?;

        let mut session = SessionOptions::new(connect_string);
        session.session_timeout = Duration::from_millis(self.session_timeout_ms);
        session.operation_timeout = Duration::from_millis(self.operation_timeout_ms);

        let mut options =
            RepositoryOptions::new(session, self.initial_admin_password_hash.clone());
        options.cluster_name.clone_from(&self.cluster_name);

        Ok(options)
    }
}
