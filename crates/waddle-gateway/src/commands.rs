//! Line command protocol for the development gateway.
//!
//! Credentials are trusted as claimed: `signin` promotes the connection to
//! whatever (uid, device) the client names. Replies are queued back to the
//! sending session through the manager like any other message.
//!
//! ```text
//! signin <uid> <device>          authenticate this connection
//! send <uid> <device|*> <text>   deliver text to one device or all of them
//! online <uid>                   list the devices a user is online on
//! who                            list every signed-in user
//! logout                         close this session
//! ```

use std::str::FromStr;
use std::sync::Weak;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use waddle_session::{
    DeliveryReport, Device, Identity, InboundHandler, Message, Principal, SessionManager,
    SignInOutcome,
};

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignIn { uid: Principal, device: Device },
    Send { uid: Principal, device: Device, text: String },
    Online { uid: Principal },
    Who,
    Logout,
}

/// Why a line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid {what} '{value}'")]
    InvalidNumber { what: &'static str, value: String },
    #[error("frame is not UTF-8")]
    NotUtf8,
}

const SIGNIN_USAGE: &str = "signin <uid> <device>";
const SEND_USAGE: &str = "send <uid> <device|*> <text>";
const ONLINE_USAGE: &str = "online <uid>";

fn number<T: From<i64>>(
    what: &'static str,
    value: Option<&str>,
    usage: &'static str,
) -> Result<T, CommandError> {
    let value = value.ok_or(CommandError::Usage(usage))?;
    value
        .parse::<i64>()
        .map(T::from)
        .map_err(|_| CommandError::InvalidNumber {
            what,
            value: value.to_string(),
        })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let mut args = rest.trim_start().splitn(3, ' ');

        match verb {
            "" => Err(CommandError::Empty),
            "signin" => Ok(Command::SignIn {
                uid: number("uid", args.next(), SIGNIN_USAGE)?,
                device: number("device", args.next(), SIGNIN_USAGE)?,
            }),
            "send" => {
                let uid = number("uid", args.next(), SEND_USAGE)?;
                let device = match args.next() {
                    Some("*") => Device::ALL,
                    other => number("device", other, SEND_USAGE)?,
                };
                let text = args
                    .next()
                    .filter(|text| !text.is_empty())
                    .ok_or(CommandError::Usage(SEND_USAGE))?;
                Ok(Command::Send {
                    uid,
                    device,
                    text: text.to_string(),
                })
            }
            "online" => Ok(Command::Online {
                uid: number("uid", args.next(), ONLINE_USAGE)?,
            }),
            "who" => Ok(Command::Who),
            "logout" => Ok(Command::Logout),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Inbound handler executing [`Command`]s against the session manager.
///
/// Holds the manager weakly: the manager owns this handler.
pub struct CommandHandler {
    manager: Weak<SessionManager>,
}

impl CommandHandler {
    pub fn new(manager: Weak<SessionManager>) -> Self {
        Self { manager }
    }

    fn reply(manager: &SessionManager, to: Identity, text: impl Into<String>) {
        manager.enqueue_message(to.principal, to.device, Message::from(text.into()));
    }

    fn execute(&self, manager: &SessionManager, from: Identity, command: Command) {
        match command {
            Command::SignIn { uid, device } => {
                if !from.is_anonymous() {
                    Self::reply(manager, from, "err already signed in");
                    return;
                }
                match manager.sign_in(from.principal, uid, device) {
                    SignInOutcome::SignedIn { .. } => {
                        let identity = Identity::new(uid, device);
                        Self::reply(manager, identity, format!("ok signed-in {}", identity));
                    }
                    SignInOutcome::InvalidIdentity => {
                        Self::reply(manager, from, "err invalid identity");
                    }
                    SignInOutcome::UnknownConnection => {}
                }
            }
            Command::Send { uid, device, text } => {
                if from.is_anonymous() {
                    Self::reply(manager, from, "err sign in first");
                    return;
                }
                let message = format!("msg {} {} {}", from.principal, from.device, text);
                let reply = match manager.enqueue_message(uid, device, Message::from(message)) {
                    DeliveryReport::Offline => "ok offline".to_string(),
                    DeliveryReport::Delivered { queued, dropped } => {
                        format!("ok queued={} dropped={}", queued, dropped)
                    }
                };
                Self::reply(manager, from, reply);
            }
            Command::Online { uid } => {
                let devices = manager.devices(uid);
                let reply = if devices.is_empty() {
                    format!("offline {}", uid)
                } else {
                    let list: Vec<String> = devices.iter().map(|d| d.to_string()).collect();
                    format!("online {} {}", uid, list.join(" "))
                };
                Self::reply(manager, from, reply);
            }
            Command::Who => {
                let mut reply = String::from("who");
                for uid in manager.all_principals() {
                    reply.push(' ');
                    reply.push_str(&uid.to_string());
                }
                Self::reply(manager, from, reply);
            }
            Command::Logout => {
                if from.is_anonymous() {
                    Self::reply(manager, from, "err not signed in");
                    return;
                }
                Self::reply(manager, from, "ok bye");
                manager.logout(from.principal, from.device);
            }
        }
    }
}

impl InboundHandler for CommandHandler {
    fn handle_frame(&self, from: Identity, frame: Bytes) {
        let Some(manager) = self.manager.upgrade() else {
            debug!(from = %from, "Session manager gone, ignoring frame");
            return;
        };

        let parsed = std::str::from_utf8(&frame)
            .map_err(|_| CommandError::NotUtf8)
            .and_then(Command::from_str);

        match parsed {
            Ok(command) => {
                debug!(from = %from, ?command, "Executing command");
                self.execute(&manager, from, command);
            }
            Err(CommandError::Empty) => {}
            Err(e) => {
                warn!(from = %from, error = %e, "Rejected command");
                Self::reply(&manager, from, format!("err {}", e));
            }
        }
    }
}
