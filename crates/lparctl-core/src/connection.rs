//! Explicit connection handle tying a session to its correspondence table.
//!
//! Opening a connection runs the full bring-up in order: connect,
//! authenticate, detect the console type, enumerate live partitions and
//! initialize the table. Any failure aborts the open, and the session is
//! disconnected before the error is returned.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthPrompt, KeyPair, authenticate};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::exec::{CommandOutput, Execute};
use crate::inventory::{Inventory, SystemType};
use crate::session::Ssh2Session;
use crate::target::Target;
use crate::uuid_table::{Entry, TablePaths, TableSync, UuidTable};

/// Everything an open connection needs from its session
pub trait RemoteSession: Execute + TableSync {
    /// Sends a goodbye and tears the session down
    fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// An open console connection.
///
/// Not meant to be shared across threads; every operation takes `&mut self`.
#[derive(Debug)]
pub struct Connection<S: RemoteSession = Ssh2Session> {
    session: Option<S>,
    table: UuidTable,
    system_type: SystemType,
    target: Target,
    username: String,
}

impl Connection<Ssh2Session> {
    /// Connects and authenticates to `target`, then brings the table up.
    pub fn open(config: &Config, target: Target, prompt: Option<&dyn AuthPrompt>) -> Result<Self> {
        let port = target.port.unwrap_or(config.connection.port);
        info!(host = %target.host, port, "connecting");
        let mut session = Ssh2Session::connect(&target.host, port)?;

        let key = KeyPair::resolve(
            config.connection.private_key.as_deref(),
            config.connection.public_key.as_deref(),
        );
        let username = match authenticate(
            &mut session,
            &target.host,
            target.user.as_deref(),
            key.as_ref(),
            prompt,
        ) {
            Ok(username) => username,
            Err(err) => {
                hang_up(&mut session, &target.host);
                return Err(err);
            }
        };

        let paths = config.table.paths_for(&username);
        let inventory = Inventory::from(&config.inventory);
        Self::establish(session, target, username, &inventory, paths)
    }
}

impl<S: RemoteSession> Connection<S> {
    /// Finishes bring-up on an authenticated session.
    pub fn establish(
        mut session: S,
        target: Target,
        username: String,
        inventory: &Inventory,
        paths: TablePaths,
    ) -> Result<Self> {
        let (system_type, table) = match Self::bring_up(&mut session, &target, inventory, paths) {
            Ok(ready) => ready,
            Err(err) => {
                hang_up(&mut session, &target.host);
                return Err(err);
            }
        };
        info!(
            host = %target.host,
            user = %username,
            %system_type,
            partitions = table.entries().len(),
            "connection ready"
        );

        Ok(Self {
            session: Some(session),
            table,
            system_type,
            target,
            username,
        })
    }

    fn bring_up(
        session: &mut S,
        target: &Target,
        inventory: &Inventory,
        paths: TablePaths,
    ) -> Result<(SystemType, UuidTable)> {
        let system_type = SystemType::detect(session)?;
        let live = inventory.live_ids(session, system_type, target.managed_system.as_deref())?;

        let mut table = UuidTable::new(paths);
        table.init(session, &live)?;
        Ok((system_type, table))
    }

    fn session_mut(&mut self) -> Result<&mut S> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::NotConnected)))
    }

    pub fn execute(&mut self, command: &str) -> Result<CommandOutput> {
        self.session_mut()?.execute(command)
    }

    pub fn execute_trimmed(&mut self, command: &str) -> Result<CommandOutput> {
        self.session_mut()?.execute_trimmed(command)
    }

    pub fn execute_expect_int(&mut self, command: &str) -> Result<i32> {
        self.session_mut()?.execute_expect_int(command)
    }

    pub fn lookup_uuid(&self, id: i32) -> Result<Uuid> {
        self.table
            .lookup(id)
            .ok_or_else(|| Error::NotFound(format!("no uuid for partition {id}")))
    }

    /// Records `uuid` (or a freshly generated one) for partition `id`.
    pub fn add_uuid(&mut self, id: i32, uuid: Option<Uuid>) -> Result<Uuid> {
        let uuid = match uuid {
            Some(uuid) => uuid,
            None => self.table.generate_uuid(),
        };
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::NotConnected)))?;
        self.table.add(session, uuid, id)?;
        debug!(id, %uuid, "added table entry");
        Ok(uuid)
    }

    /// Tombstones partition `id`; returns how many entries matched.
    pub fn remove_uuid(&mut self, id: i32) -> Result<usize> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::from(std::io::ErrorKind::NotConnected)))?;
        self.table.remove(session, id)
    }

    pub fn entries(&self) -> &[Entry] {
        self.table.entries()
    }

    pub fn system_type(&self) -> SystemType {
        self.system_type
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The managed-system selector to splice into console commands
    pub fn scope_flag(&self) -> String {
        self.system_type
            .scope_flag(self.target.managed_system.as_deref())
    }

    pub fn is_alive(&self) -> bool {
        self.session.as_ref().is_some_and(RemoteSession::is_connected)
    }

    /// Always true: the only transport is SSH.
    pub fn is_encrypted(&self) -> bool {
        true
    }

    /// Always true: the only transport is SSH.
    pub fn is_secure(&self) -> bool {
        true
    }

    /// Disconnects; the table's persisted copies outlive the connection.
    pub fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => session.disconnect(),
            None => Ok(()),
        }
    }
}

impl<S: RemoteSession> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            hang_up(&mut session, &self.target.host);
        }
    }
}

/// Best-effort disconnect; failures are only logged.
fn hang_up<S: RemoteSession + ?Sized>(session: &mut S, host: &str) {
    if let Err(err) = session.disconnect() {
        warn!(host, error = %err, "disconnect failed");
    }
}
