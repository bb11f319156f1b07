//! FTP command builder.

use std::fmt;

use crate::connection::TransferMode;

/// FTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// USER - Send user name
    User(String),
    /// PASS - Send password
    Pass(String),
    /// AUTH TLS - Upgrade the control connection (explicit FTPS)
    AuthTls,
    /// PBSZ - Protection buffer size
    Pbsz(u32),
    /// PROT - Data channel protection level (`P` for private)
    Prot(char),
    /// FEAT - List server features
    Feat,
    /// OPTS - Set an option (e.g., `UTF8 ON`)
    Opts(String),
    /// CLNT - Announce client name
    Clnt(String),
    /// TYPE - Set representation type
    Type {
        /// Transfer mode
        mode: TransferMode,
        /// Optional second type character (e.g., `N` for `TYPE A N`)
        second: Option<char>,
    },
    /// PWD - Print working directory
    Pwd,
    /// CWD - Change working directory
    Cwd(String),
    /// MKD - Make directory
    Mkd(String),
    /// RMD - Remove directory
    Rmd(String),
    /// DELE - Delete file
    Dele(String),
    /// RNFR - Rename from
    Rnfr(String),
    /// RNTO - Rename to
    Rnto(String),
    /// SIZE - File size
    Size(String),
    /// EPSV - Extended passive mode
    Epsv,
    /// PASV - Passive mode
    Pasv,
    /// LIST - Directory listing, optionally with a flag argument
    List(Option<String>),
    /// MLSD - Machine-readable directory listing
    Mlsd,
    /// RETR - Retrieve file
    Retr(String),
    /// STOR - Store file
    Stor(String),
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
    /// Arbitrary command line, sent as-is
    Raw(String),
}

impl Command {
    /// Returns the command verb.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::User(_) => "USER",
            Self::Pass(_) => "PASS",
            Self::AuthTls => "AUTH",
            Self::Pbsz(_) => "PBSZ",
            Self::Prot(_) => "PROT",
            Self::Feat => "FEAT",
            Self::Opts(_) => "OPTS",
            Self::Clnt(_) => "CLNT",
            Self::Type { .. } => "TYPE",
            Self::Pwd => "PWD",
            Self::Cwd(_) => "CWD",
            Self::Mkd(_) => "MKD",
            Self::Rmd(_) => "RMD",
            Self::Dele(_) => "DELE",
            Self::Rnfr(_) => "RNFR",
            Self::Rnto(_) => "RNTO",
            Self::Size(_) => "SIZE",
            Self::Epsv => "EPSV",
            Self::Pasv => "PASV",
            Self::List(_) => "LIST",
            Self::Mlsd => "MLSD",
            Self::Retr(_) => "RETR",
            Self::Stor(_) => "STOR",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
            Self::Raw(_) => "",
        }
    }

    /// Returns the command argument, if any.
    #[must_use]
    pub fn argument(&self) -> Option<String> {
        match self {
            Self::User(arg)
            | Self::Pass(arg)
            | Self::Opts(arg)
            | Self::Clnt(arg)
            | Self::Cwd(arg)
            | Self::Mkd(arg)
            | Self::Rmd(arg)
            | Self::Dele(arg)
            | Self::Rnfr(arg)
            | Self::Rnto(arg)
            | Self::Size(arg)
            | Self::Retr(arg)
            | Self::Stor(arg) => Some(arg.clone()),
            Self::List(arg) => arg.clone(),
            Self::AuthTls => Some("TLS".to_string()),
            Self::Pbsz(size) => Some(size.to_string()),
            Self::Prot(level) => Some(level.to_string()),
            Self::Type { mode, second } => Some(second.map_or_else(
                || mode.type_char().to_string(),
                |c| format!("{} {c}", mode.type_char()),
            )),
            Self::Feat
            | Self::Pwd
            | Self::Epsv
            | Self::Pasv
            | Self::Mlsd
            | Self::Noop
            | Self::Quit
            | Self::Raw(_) => None,
        }
    }

    /// Serializes the command to bytes, CRLF-terminated.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Raw(line) => buf.extend_from_slice(line.as_bytes()),
            _ => {
                buf.extend_from_slice(self.verb().as_bytes());
                if let Some(arg) = self.argument() {
                    buf.push(b' ');
                    buf.extend_from_slice(arg.as_bytes());
                }
            }
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Renders `VERB[ arg]` for diagnostics. Passwords are shown as `*****`.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(_) => f.write_str("PASS *****"),
            Self::Raw(line) => f.write_str(line),
            _ => {
                f.write_str(self.verb())?;
                if let Some(arg) = self.argument() {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_user_command() {
        let cmd = Command::User("anonymous".to_string());
        assert_eq!(cmd.serialize(), b"USER anonymous\r\n");
    }

    #[test]
    fn test_no_argument_commands() {
        assert_eq!(Command::Feat.serialize(), b"FEAT\r\n");
        assert_eq!(Command::Epsv.serialize(), b"EPSV\r\n");
        assert_eq!(Command::List(None).serialize(), b"LIST\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_auth_and_protection() {
        assert_eq!(Command::AuthTls.serialize(), b"AUTH TLS\r\n");
        assert_eq!(Command::Pbsz(0).serialize(), b"PBSZ 0\r\n");
        assert_eq!(Command::Prot('P').serialize(), b"PROT P\r\n");
    }

    #[test]
    fn test_type_command() {
        let cmd = Command::Type {
            mode: TransferMode::Binary,
            second: None,
        };
        assert_eq!(cmd.serialize(), b"TYPE I\r\n");

        let cmd = Command::Type {
            mode: TransferMode::Ascii,
            second: Some('N'),
        };
        assert_eq!(cmd.serialize(), b"TYPE A N\r\n");
    }

    #[test]
    fn test_list_with_flag() {
        let cmd = Command::List(Some("-t".to_string()));
        assert_eq!(cmd.serialize(), b"LIST -t\r\n");
    }

    #[test]
    fn test_raw_command() {
        let cmd = Command::Raw("SITE CHMOD 644 a.txt".to_string());
        assert_eq!(cmd.serialize(), b"SITE CHMOD 644 a.txt\r\n");
        assert_eq!(cmd.to_string(), "SITE CHMOD 644 a.txt");
    }

    #[test]
    fn test_password_is_redacted_in_display() {
        let cmd = Command::Pass("hunter2".to_string());
        assert_eq!(cmd.to_string(), "PASS *****");
        assert_eq!(cmd.serialize(), b"PASS hunter2\r\n");
    }

    #[test]
    fn test_display_matches_wire_form() {
        let cmd = Command::Opts("UTF8 ON".to_string());
        assert_eq!(cmd.to_string(), "OPTS UTF8 ON");
        assert_eq!(cmd.to_string().as_bytes(), &cmd.serialize()[..12]);
    }
}
