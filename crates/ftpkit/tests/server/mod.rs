//! In-process FTP server backed by an in-memory file tree.

#![allow(dead_code, clippy::unwrap_used, clippy::too_many_lines)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ftpkit::{Config, ConfigBuilder};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

/// Listing format served for `LIST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Unix,
    Dos,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Reply to `FEAT`; `false` answers 502.
    pub feat: bool,
    /// Advertise `MLSD` in the `FEAT` reply.
    pub mlsd: bool,
    /// Accept `EPSV`; `false` answers 500.
    pub epsv: bool,
    pub list_style: ListStyle,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            feat: true,
            mlsd: true,
            epsv: true,
            list_style: ListStyle::Unix,
        }
    }
}

/// `modify` fact served for files added without an explicit time.
const DEFAULT_MODIFIED: &str = "20240315093000";

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    File { data: Vec<u8>, modified: String },
}

impl Entry {
    fn file(data: Vec<u8>) -> Self {
        Self::File {
            data,
            modified: DEFAULT_MODIFIED.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    entries: BTreeMap<String, Entry>,
    log: Vec<String>,
}

/// Handle to a running server.
pub struct FakeServer {
    pub addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
}

impl FakeServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Mutex::new(Shared::default()));
        shared
            .lock()
            .unwrap()
            .entries
            .insert("/".to_string(), Entry::Dir);

        let options = Arc::new(options);
        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(session(
                    socket,
                    Arc::clone(&options),
                    Arc::clone(&accept_shared),
                ));
            }
        });

        Self { addr, shared }
    }

    /// Builder pointing at this server with valid credentials.
    pub fn config(&self) -> ConfigBuilder {
        Config::builder("127.0.0.1")
            .port(self.addr.port())
            .credentials("alice", "secret")
            .timeout(Duration::from_secs(5))
            .disconnect_timeout(Duration::from_secs(1))
    }

    pub fn add_dir(&self, path: &str) {
        self.shared
            .lock()
            .unwrap()
            .entries
            .insert(path.to_string(), Entry::Dir);
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.add_file_modified(path, contents, DEFAULT_MODIFIED);
    }

    /// Adds a file whose MLSD `modify` fact is `modified` (`YYYYMMDDHHMMSS`).
    pub fn add_file_modified(&self, path: &str, contents: &[u8], modified: &str) {
        self.shared.lock().unwrap().entries.insert(
            path.to_string(),
            Entry::File {
                data: contents.to_vec(),
                modified: modified.to_string(),
            },
        );
    }

    pub fn exists(&self, path: &str) -> bool {
        self.shared.lock().unwrap().entries.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.shared.lock().unwrap().entries.get(path),
            Some(Entry::Dir)
        )
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.shared.lock().unwrap().entries.get(path) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every command line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.shared.lock().unwrap().log.clone()
    }

    /// Received commands whose verb is `verb`.
    pub fn commands_named(&self, verb: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .collect()
    }
}

/// Joins `arg` onto `cwd` and normalizes `.` and `..`.
fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{cwd}/{arg}")
    };
    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

fn children(entries: &BTreeMap<String, Entry>, dir: &str) -> Vec<(String, Entry)> {
    entries
        .iter()
        .filter(|(path, _)| path.as_str() != "/" && parent_of(path) == dir)
        .map(|(path, entry)| {
            let name = path.rsplit('/').next().unwrap_or_default().to_string();
            (name, entry.clone())
        })
        .collect()
}

/// MLSD records, led by `cdir`/`pdir` entries named by full path.
fn mlsd_lines(dir: &str, entries: &[(String, Entry)]) -> String {
    let mut out = format!(
        "type=cdir;perm=el;modify=20240101120000; {dir}\r\ntype=pdir;perm=el; {}\r\n",
        parent_of(dir)
    );
    for (name, entry) in entries {
        match entry {
            Entry::Dir => {
                out.push_str(&format!("type=dir;modify=20240101120000; {name}\r\n"));
            }
            Entry::File { data, modified } => out.push_str(&format!(
                "type=file;size={};modify={modified}; {name}\r\n",
                data.len()
            )),
        }
    }
    out
}

fn list_lines(entries: &[(String, Entry)], style: ListStyle) -> String {
    let mut out = String::new();
    if style == ListStyle::Unix {
        out.push_str(&format!("total {}\r\n", entries.len()));
    }
    for (name, entry) in entries {
        let line = match (style, entry) {
            (ListStyle::Unix, Entry::Dir) => {
                format!("drwxr-xr-x  2 ftp ftp     4096 Jan 01  2024 {name}")
            }
            (ListStyle::Unix, Entry::File { data, .. }) => {
                format!("-rw-r--r--  1 ftp ftp {:>8} Mar 15  2024 {name}", data.len())
            }
            (ListStyle::Dos, Entry::Dir) => {
                format!("01-01-24  10:00AM       <DIR>          {name}")
            }
            (ListStyle::Dos, Entry::File { data, .. }) => {
                format!("03-15-24  09:30AM {:>20} {name}", data.len())
            }
        };
        out.push_str(&line);
        out.push_str("\r\n");
    }
    out
}

async fn reply(writer: &mut OwnedWriteHalf, text: &str) {
    writer
        .write_all(format!("{text}\r\n").as_bytes())
        .await
        .unwrap();
}

async fn bind_passive() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn session(socket: TcpStream, options: Arc<ServerOptions>, shared: Arc<Mutex<Shared>>) {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();
    reply(&mut writer, "220-Welcome to the test server\r\n220 Ready").await;

    let mut cwd = "/".to_string();
    let mut user = String::new();
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;
    let mut rename_from: Option<String> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        shared.lock().unwrap().log.push(line.clone());
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let verb = verb.to_ascii_uppercase();

        let text = match verb.as_str() {
            "USER" => {
                user = arg.to_string();
                "331 Password required".to_string()
            }
            "PASS" => {
                if user == "anonymous" || (user == "alice" && arg == "secret") {
                    logged_in = true;
                    "230 Logged in".to_string()
                } else if user == "guest" {
                    logged_in = true;
                    "202 Already logged in".to_string()
                } else {
                    "530 Login incorrect".to_string()
                }
            }
            "QUIT" => {
                reply(&mut writer, "221 Goodbye").await;
                break;
            }
            "NOOP" => "200 NOOP ok".to_string(),
            _ if !logged_in => "530 Please login with USER and PASS".to_string(),
            "FEAT" if !options.feat => "502 FEAT not implemented".to_string(),
            "FEAT" => {
                let mlsd = if options.mlsd { " MLSD\r\n" } else { "" };
                format!("211-Features:\r\n{mlsd} SIZE\r\n UTF8\r\n211 End")
            }
            "OPTS" => "200 UTF8 set to on".to_string(),
            "TYPE" => format!("200 Type set to {arg}"),
            "CLNT" => "200 Noted".to_string(),
            "PWD" => format!("257 \"{cwd}\" is the current directory"),
            "CWD" => {
                let path = resolve(&cwd, arg);
                let is_dir = matches!(
                    shared.lock().unwrap().entries.get(&path),
                    Some(Entry::Dir)
                );
                if is_dir {
                    cwd = path;
                    "250 Directory changed".to_string()
                } else {
                    "550 No such directory".to_string()
                }
            }
            "MKD" => {
                let path = resolve(&cwd, arg);
                let mut shared = shared.lock().unwrap();
                let parent_ok =
                    matches!(shared.entries.get(&parent_of(&path)), Some(Entry::Dir));
                if shared.entries.contains_key(&path) || !parent_ok {
                    "550 Cannot create directory".to_string()
                } else {
                    shared.entries.insert(path.clone(), Entry::Dir);
                    format!("257 \"{path}\" created")
                }
            }
            "RMD" => {
                let path = resolve(&cwd, arg);
                let mut shared = shared.lock().unwrap();
                if !matches!(shared.entries.get(&path), Some(Entry::Dir)) {
                    "550 No such directory".to_string()
                } else if !children(&shared.entries, &path).is_empty() {
                    "550 Directory not empty".to_string()
                } else {
                    shared.entries.remove(&path);
                    "250 Directory removed".to_string()
                }
            }
            "DELE" => {
                let path = resolve(&cwd, arg);
                let mut shared = shared.lock().unwrap();
                if matches!(shared.entries.get(&path), Some(Entry::File { .. })) {
                    shared.entries.remove(&path);
                    "250 File deleted".to_string()
                } else {
                    "550 No such file".to_string()
                }
            }
            "RNFR" => {
                let path = resolve(&cwd, arg);
                if shared.lock().unwrap().entries.contains_key(&path) {
                    rename_from = Some(path);
                    "350 Ready for RNTO".to_string()
                } else {
                    "550 No such file".to_string()
                }
            }
            "RNTO" => match rename_from.take() {
                Some(from) => {
                    let to = resolve(&cwd, arg);
                    let mut shared = shared.lock().unwrap();
                    if let Some(entry) = shared.entries.remove(&from) {
                        shared.entries.insert(to, entry);
                    }
                    "250 Renamed".to_string()
                }
                None => "503 RNFR required first".to_string(),
            },
            "SIZE" => {
                let path = resolve(&cwd, arg);
                match shared.lock().unwrap().entries.get(&path) {
                    Some(Entry::File { data, .. }) => format!("213 {}", data.len()),
                    _ => "550 No such file".to_string(),
                }
            }
            "EPSV" if !options.epsv => "500 EPSV not understood".to_string(),
            "EPSV" => {
                let (listener, port) = bind_passive().await;
                passive = Some(listener);
                format!("229 Entering Extended Passive Mode (|||{port}|)")
            }
            "PASV" => {
                let (listener, port) = bind_passive().await;
                passive = Some(listener);
                format!(
                    "227 Entering Passive Mode (10,0,0,99,{},{})",
                    port / 256,
                    port % 256
                )
            }
            "MLSD" | "LIST" | "RETR" | "STOR" => {
                let Some(listener) = passive.take() else {
                    reply(&mut writer, "425 Use PASV first").await;
                    continue;
                };
                transfer(&verb, arg, &cwd, listener, &mut writer, &options, &shared).await;
                continue;
            }
            _ => "500 Unknown command".to_string(),
        };
        reply(&mut writer, &text).await;
    }
}

async fn transfer(
    verb: &str,
    arg: &str,
    cwd: &str,
    listener: TcpListener,
    writer: &mut OwnedWriteHalf,
    options: &ServerOptions,
    shared: &Mutex<Shared>,
) {
    let payload = {
        let shared = shared.lock().unwrap();
        match verb {
            "MLSD" => Some(mlsd_lines(cwd, &children(&shared.entries, cwd)).into_bytes()),
            "LIST" => {
                Some(list_lines(&children(&shared.entries, cwd), options.list_style).into_bytes())
            }
            "RETR" => match shared.entries.get(&resolve(cwd, arg)) {
                Some(Entry::File { data, .. }) => Some(data.clone()),
                _ => None,
            },
            _ => Some(Vec::new()),
        }
    };
    let Some(payload) = payload else {
        reply(writer, "550 No such file").await;
        return;
    };

    reply(writer, "150 Opening data connection").await;
    let (mut data, _) = listener.accept().await.unwrap();
    let outcome = if verb == "STOR" {
        let mut received = Vec::new();
        let outcome = data.read_to_end(&mut received).await.map(|_| ());
        if outcome.is_ok() {
            shared
                .lock()
                .unwrap()
                .entries
                .insert(resolve(cwd, arg), Entry::file(received));
        }
        outcome
    } else {
        match data.write_all(&payload).await {
            Ok(()) => data.shutdown().await,
            Err(e) => Err(e),
        }
    };
    drop(data);

    // A client that drops the data connection early gets 426, as real servers send.
    let text = if outcome.is_ok() {
        "226 Transfer complete"
    } else {
        "426 Connection closed; transfer aborted"
    };
    reply(writer, text).await;
}
