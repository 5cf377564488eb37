//! Command dispatch.
//!
//! The `Dispatcher` turns one raw request into exactly one reply:
//!
//! 1. decode the frame body into a [`Command`] (a decode failure never
//!    reaches the registry)
//! 2. `controller.stop` marks the server as stopping
//! 3. unknown target → `Subsystem '<target>' not found`
//! 4. unsupported verb → `Command '<target>.<verb>' not found`
//! 5. invoke the handler and stamp `subsystem = <target>` on the reply
//!
//! Handlers are invoked one at a time; the dispatcher is owned by the single
//! dispatch thread of the server.

use crate::registry::ModuleRegistry;
use growth_common::consts::CONTROLLER_TARGET;
use growth_common::protocol::{Command, CommandRequest, ProtocolError, Reply, ReplyFrame, Target};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

/// Verb of the in-band shutdown command.
const STOP_VERB: &str = "stop";

/// Routes decoded commands to registered modules.
pub struct Dispatcher {
    registry: ModuleRegistry,
    stopping: bool,
}

impl Dispatcher {
    /// Create a dispatcher over a fully populated registry.
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            stopping: false,
        }
    }

    /// True once `controller.stop` has been processed.
    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Registered modules.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Decode a raw frame body and dispatch it.
    pub fn handle_bytes(&mut self, payload: &[u8]) -> ReplyFrame {
        let decoded = serde_json::from_slice::<CommandRequest>(payload)
            .map_err(ProtocolError::from)
            .and_then(Command::parse);
        match decoded {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                warn!("Rejected malformed command message ({})", e);
                Reply::error(format!("Invalid command message ({e})")).into_frame(CONTROLLER_TARGET)
            }
        }
    }

    /// Dispatch a parsed command.
    pub fn dispatch(&mut self, command: Command) -> ReplyFrame {
        let subsystem = command.target.name().to_string();
        info!(
            "Subsystem: {} Command: {} Option: {}",
            subsystem,
            command.verb,
            serde_json::to_string(&command.options).unwrap_or_default()
        );

        let reply = match &command.target {
            Target::Controller => self.controller_command(&command.verb),
            Target::Module(name) => self.module_command(name, &command),
        };
        reply.into_frame(&subsystem)
    }

    fn controller_command(&mut self, verb: &str) -> Reply {
        if verb == STOP_VERB {
            info!("Stop requested");
            self.stopping = true;
            return Reply::ok().with_message("Controller has been stopped");
        }
        command_not_found(CONTROLLER_TARGET, verb)
    }

    fn module_command(&mut self, name: &str, command: &Command) -> Reply {
        if self.registry.resolve(name).is_none() {
            return Reply::error(format!("Subsystem '{name}' not found"));
        }
        if !self.registry.supports(name, &command.verb) {
            return command_not_found(name, &command.verb);
        }

        let registry = &mut self.registry;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.invoke(name, &command.verb, &command.options)
        }));
        match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) => command_not_found(name, &command.verb),
            Err(_) => {
                error!("Subsystem '{}' panicked while executing '{}'", name, command.verb);
                Reply::error(format!(
                    "Subsystem '{name}' failed to execute '{}'",
                    command.verb
                ))
            }
        }
    }
}

fn command_not_found(target: &str, verb: &str) -> Reply {
    Reply::error(format!("Command '{target}.{verb}' not found"))
}
