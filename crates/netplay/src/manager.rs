use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use crate::client::{Client, ConnectionState};
use crate::command::{Command, CommandError, HELP};
use crate::net::protocol::PacketRegistry;
use crate::net::transport::resolve_address;
use crate::server::{Server, ServerConfig, ServerHandle};

/// Owns at most one hosted server and at most one outbound client.
pub struct NetworkManager {
    registry: Arc<PacketRegistry>,
    config: ServerConfig,
    client: Option<Client>,
    server: Option<ServerHandle>,
}

impl NetworkManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(PacketRegistry::with_catalog()),
            config,
            client: None,
            server: None,
        }
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    pub fn has_server(&self) -> bool {
        self.server.as_ref().is_some_and(|s| s.is_running())
    }

    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn client_state(&self) -> Option<ConnectionState> {
        self.client.as_ref().map(Client::state)
    }

    pub fn start_server(&mut self, host: &str, port: u16) -> Result<SocketAddr, CommandError> {
        if let Some(server) = self.server.as_ref().filter(|s| s.is_running()) {
            return Err(CommandError::ServerActive(server.local_addr()));
        }

        let addr = resolve_address(host, port)?;
        let server = Server::bind(addr, self.config.clone(), Arc::clone(&self.registry))?;
        let handle = server.spawn()?;
        let local_addr = handle.local_addr();
        self.server = Some(handle);
        Ok(local_addr)
    }

    pub fn stop_server(&mut self) -> Result<(), CommandError> {
        let mut server = self.server.take().ok_or(CommandError::NoServer)?;
        server.stop();
        Ok(())
    }

    pub fn join_server(&mut self, host: &str, port: u16, name: &str) -> Result<(), CommandError> {
        if self.client.is_some() {
            return Err(CommandError::AlreadyInServer);
        }

        let addr = resolve_address(host, port)?;
        let mut client = Client::new(addr, name, Arc::clone(&self.registry));
        client.connect()?;
        self.client = Some(client);
        Ok(())
    }

    pub fn leave_server(&mut self) -> Result<(), CommandError> {
        let client = self.client.take().ok_or(CommandError::NotInServer)?;
        info!("Leaving {}", client.server_addr());
        drop(client);
        Ok(())
    }

    fn ready_client(&mut self) -> Result<&mut Client, CommandError> {
        let client = self.client.as_mut().ok_or(CommandError::NotInServer)?;
        if !client.is_ready() {
            return Err(CommandError::NotReady(client.state()));
        }
        Ok(client)
    }

    pub fn list_players(&mut self) -> Result<(), CommandError> {
        self.ready_client()?.request_player_list()?;
        Ok(())
    }

    pub fn say(&mut self, text: &str) -> Result<(), CommandError> {
        self.ready_client()?.send_message(text)?;
        Ok(())
    }

    /// Per-frame pump. Releases a client that has left and a server whose
    /// thread has ended.
    pub fn update(&mut self) {
        if let Some(client) = self.client.as_mut() {
            client.update();
            if client.has_left() {
                info!("No longer connected to {}", client.server_addr());
                self.client = None;
            }
        }

        if self.server.as_ref().is_some_and(|s| !s.is_running()) {
            self.server = None;
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::StartServer { host, port } => {
                let addr = self.start_server(&host, port)?;
                info!("Server started on {}", addr);
            }
            Command::StopServer => {
                self.stop_server()?;
                info!("Server stopped");
            }
            Command::JoinServer { host, port, name } => self.join_server(&host, port, &name)?,
            Command::LeaveServer => self.leave_server()?,
            Command::List => self.list_players()?,
            Command::Say(text) => self.say(&text)?,
            Command::Help => {
                for line in HELP.lines() {
                    info!("{}", line);
                }
            }
        }
        Ok(())
    }
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
