//! Configuration module for the mail gate.
//!
//! Two sources feed the service: a handful of environment variables for the
//! listener ([`ServerConfig`]) and an INI file holding everything the request
//! pipeline reads ([`Settings`]). Both are loaded once at startup; a bad value
//! in either is fatal.

use std::{fmt, path::{Path, PathBuf}, time::Duration};

use config::{Config, File, FileFormat};
use lettre::Address;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("cannot read configuration file: {0}")]
    Read(#[from] std::io::Error),
    #[error("{0} must be written without quotes or backslash escapes")]
    Rewritten(&'static str),
    #[error("{key}: `{value}` is not a recognized flag (use 1/0, true/false, yes/no, on/off)")]
    InvalidFlag { key: &'static str, value: String },
    #[error("{key}: `{value}` is not a valid email address")]
    InvalidAddress { key: &'static str, value: String },
    #[error("{key}: `{value}` is not a valid number")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("unknown transport method `{0}` (expected sendmail, smtp, file or stub)")]
    UnknownTransport(String),
}

/// Listener configuration, read from the environment.
/// > A `.env` file is honored when present.
/// # Environment Variables:
/// |Variable|Description|
/// |:------:|:---------:|
/// |`MAILGATE_CONFIG`|Path to the INI settings file|
/// |`LISTEN_ADDR`|Address to bind to (e.g. `127.0.0.1`)|
/// |`LISTEN_PORT`|Port to bind to (e.g. `8080`)|
///
/// --------------------------------------------------------------------
/// ## Defaults:
/// |`MAILGATE_CONFIG`|`LISTEN_ADDR`|`LISTEN_PORT`|
/// |:---------------:|:-----------:|:-----------:|
/// |`config.ini`     |`127.0.0.1`  |`8080`       |
/// --------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub config_path: PathBuf,
    pub listen_addr: String,
    pub listen_port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config_path = std::env::var("MAILGATE_CONFIG").unwrap_or_else(|_| "config.ini".into());
        let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1".into());
        let listen_port = match std::env::var("LISTEN_PORT") {
            Ok(port) => parse_number("LISTEN_PORT", &port)?,
            Err(_) => 8080,
        };
        Ok(Self {
            config_path: config_path.into(),
            listen_addr,
            listen_port,
        })
    }
}

/// The shared secret callers must present.
///
/// Never printed: `Debug` is redacted so the value cannot leak through logs.
#[derive(Clone)]
pub struct SecretWord(String);

impl SecretWord {
    pub fn new(word: impl Into<String>) -> Result<Self, ConfigError> {
        let word = word.into();
        if word.is_empty() {
            return Err(ConfigError::Empty("Security.SecretWord"));
        }
        Ok(Self(word))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretWord(***)")
    }
}

/// Outbound transport selected by `Transport.Method`.
#[derive(Debug, Clone)]
pub enum TransportMethod {
    /// Hand the message to the local `sendmail` binary.
    Sendmail { command: Option<String> },
    /// STARTTLS relay with credentials.
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: SecretWord,
    },
    /// Write `.eml` files into a directory.
    File { outbox_dir: PathBuf },
    /// Keep messages in memory; nothing leaves the process.
    Stub,
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub method: TransportMethod,
    pub timeout: Duration,
}

/// Immutable snapshot of the INI settings file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub from_email: Address,
    pub from_name: String,
    pub allow_to_override: bool,
    pub default_subject: String,
    pub default_body: String,
    pub default_to: Address,
    pub secret: SecretWord,
    pub log_file: PathBuf,
    pub debug: bool,
    pub log_to_stdout: bool,
    pub use_json: bool,
    pub transport: TransportSettings,
}

impl Settings {
    /// Load and validate the INI file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = File::new(&path.to_string_lossy(), FileFormat::Ini);
        let c = Config::builder().add_source(source).build()?;
        let text = std::fs::read_to_string(path)?;
        Self::from_source(c, &text)
    }

    /// Parse settings from INI text.
    pub fn from_ini_str(ini: &str) -> Result<Self, ConfigError> {
        let source = File::from_str(ini, FileFormat::Ini);
        Self::from_source(Config::builder().add_source(source).build()?, ini)
    }

    fn from_source(c: Config, text: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = c.try_deserialize()?;
        let settings = raw.validate()?;
        // The INI reader unquotes and unescapes values. The secret must match
        // requests byte for byte, so it has to come through untouched.
        if written_value(text, "Security", "SecretWord").is_some_and(|w| w != settings.secret.expose()) {
            return Err(ConfigError::Rewritten("Security.SecretWord"));
        }
        Ok(settings)
    }
}

/// The value of `section.key` exactly as it appears in the INI text.
fn written_value<'a>(text: &'a str, section: &str, key: &str) -> Option<&'a str> {
    let mut current = "";
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim();
            continue;
        }
        if !current.eq_ignore_ascii_case(section) {
            continue;
        }
        if let Some((k, v)) = line.split_once(['=', ':']) {
            if k.trim().eq_ignore_ascii_case(key) {
                return Some(v.trim());
            }
        }
    }
    None
}

/// Cuts a trailing `; comment` or `# comment` (marker preceded by whitespace).
fn strip_inline_comment(value: &str) -> &str {
    let mut prev_space = false;
    for (i, c) in value.char_indices() {
        if prev_space && (c == ';' || c == '#') {
            return value[..i].trim_end();
        }
        prev_space = c.is_whitespace();
    }
    value
}

// Section and key names are matched both as written and lowercased, since
// the INI loader may fold case.

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(rename = "MailSettings", alias = "mailsettings")]
    mail: RawMailSettings,
    #[serde(rename = "DefaultValues", alias = "defaultvalues")]
    defaults: RawDefaults,
    #[serde(rename = "Security", alias = "security")]
    security: RawSecurity,
    #[serde(rename = "Logging", alias = "logging")]
    logging: RawLogging,
    #[serde(rename = "Output", alias = "output")]
    output: RawOutput,
    #[serde(rename = "Transport", alias = "transport", default)]
    transport: RawTransport,
}

#[derive(Debug, Deserialize)]
struct RawMailSettings {
    #[serde(rename = "FromEmail", alias = "fromemail")]
    from_email: String,
    #[serde(rename = "FromName", alias = "fromname")]
    from_name: String,
    #[serde(rename = "AllowToOverride", alias = "allowtooverride")]
    allow_to_override: String,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    #[serde(rename = "DefaultSubject", alias = "defaultsubject")]
    subject: String,
    #[serde(rename = "DefaultMailBody", alias = "defaultmailbody")]
    body: String,
    #[serde(rename = "DefaultMailTo", alias = "defaultmailto")]
    to: String,
}

#[derive(Deserialize)]
struct RawSecurity {
    #[serde(rename = "SecretWord", alias = "secretword")]
    secret_word: String,
}

impl fmt::Debug for RawSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecurity { .. }")
    }
}

#[derive(Debug, Deserialize)]
struct RawLogging {
    #[serde(rename = "LogFilePath", alias = "logfilepath")]
    log_file_path: String,
    #[serde(rename = "DebugMode", alias = "debugmode")]
    debug_mode: String,
    #[serde(rename = "LogToStdout", alias = "logtostdout", default)]
    log_to_stdout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(rename = "UseJSON", alias = "usejson")]
    use_json: String,
}

#[derive(Default, Deserialize)]
struct RawTransport {
    #[serde(rename = "Method", alias = "method", default)]
    method: Option<String>,
    #[serde(rename = "SendmailCommand", alias = "sendmailcommand", default)]
    sendmail_command: Option<String>,
    #[serde(rename = "SmtpHost", alias = "smtphost", default)]
    smtp_host: Option<String>,
    #[serde(rename = "SmtpPort", alias = "smtpport", default)]
    smtp_port: Option<String>,
    #[serde(rename = "SmtpUsername", alias = "smtpusername", default)]
    smtp_username: Option<String>,
    #[serde(rename = "SmtpPassword", alias = "smtppassword", default)]
    smtp_password: Option<String>,
    #[serde(rename = "OutboxDir", alias = "outboxdir", default)]
    outbox_dir: Option<String>,
    #[serde(rename = "TimeoutSeconds", alias = "timeoutseconds", default)]
    timeout_seconds: Option<String>,
}

impl fmt::Debug for RawTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTransport")
            .field("method", &self.method)
            .field("smtp_host", &self.smtp_host)
            .finish_non_exhaustive()
    }
}

impl RawSettings {
    fn validate(self) -> Result<Settings, ConfigError> {
        let log_file = self.logging.log_file_path.trim();
        if log_file.is_empty() {
            return Err(ConfigError::Empty("Logging.LogFilePath"));
        }
        Ok(Settings {
            from_email: parse_address("MailSettings.FromEmail", &self.mail.from_email)?,
            from_name: self.mail.from_name.trim().to_string(),
            allow_to_override: parse_flag("MailSettings.AllowToOverride", &self.mail.allow_to_override)?,
            default_subject: self.defaults.subject,
            default_body: self.defaults.body,
            default_to: parse_address("DefaultValues.DefaultMailTo", &self.defaults.to)?,
            secret: SecretWord::new(self.security.secret_word)?,
            log_file: PathBuf::from(log_file),
            debug: parse_flag("Logging.DebugMode", &self.logging.debug_mode)?,
            log_to_stdout: match self.logging.log_to_stdout {
                Some(v) => parse_flag("Logging.LogToStdout", &v)?,
                None => true,
            },
            use_json: parse_flag("Output.UseJSON", &self.output.use_json)?,
            transport: self.transport.validate()?,
        })
    }
}

impl RawTransport {
    fn validate(self) -> Result<TransportSettings, ConfigError> {
        let timeout = match self.timeout_seconds.as_deref() {
            Some(s) => Duration::from_secs(parse_number("Transport.TimeoutSeconds", s)?),
            None => Duration::from_secs(30),
        };
        let method = self
            .method
            .as_deref()
            .map(|m| strip_inline_comment(m).trim())
            .unwrap_or("sendmail")
            .to_lowercase();
        let method = match method.as_str() {
            "sendmail" => TransportMethod::Sendmail {
                command: self.sendmail_command.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            },
            "smtp" => TransportMethod::Smtp {
                host: self.smtp_host.unwrap_or_else(|| "localhost".into()),
                port: match self.smtp_port.as_deref() {
                    Some(p) => parse_number("Transport.SmtpPort", p)?,
                    None => 587,
                },
                username: self.smtp_username.unwrap_or_default(),
                password: SecretWord::new(self.smtp_password.unwrap_or_default())
                    .map_err(|_| ConfigError::Empty("Transport.SmtpPassword"))?,
            },
            "file" => TransportMethod::File {
                outbox_dir: PathBuf::from(self.outbox_dir.unwrap_or_else(|| "outbox".into())),
            },
            "stub" => TransportMethod::Stub,
            _ => return Err(ConfigError::UnknownTransport(method)),
        };
        Ok(TransportSettings { method, timeout })
    }
}

/// Strict boolean parsing; anything unrecognized is an error, never `false`.
pub fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match strip_inline_comment(value).trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key, value: value.to_string() }),
    }
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, ConfigError> {
    strip_inline_comment(value)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress { key, value: value.to_string() })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    strip_inline_comment(value)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { key, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "\
[MailSettings]
FromEmail = noreply@example.com
FromName = Example Mailer
AllowToOverride = 1

[DefaultValues]
DefaultSubject = Notification
DefaultMailBody = Hello from mailgate
DefaultMailTo = admin@example.com

[Security]
SecretWord = s3cret!

[Logging]
LogFilePath = logs/mailgate.log
DebugMode = 0

[Output]
UseJSON = 1
";

    #[test]
    fn loads_all_sections() {
        let s = Settings::from_ini_str(BASE).unwrap();
        assert_eq!(s.from_email.to_string(), "noreply@example.com");
        assert_eq!(s.from_name, "Example Mailer");
        assert!(s.allow_to_override);
        assert_eq!(s.default_subject, "Notification");
        assert_eq!(s.default_body, "Hello from mailgate");
        assert_eq!(s.default_to.to_string(), "admin@example.com");
        assert_eq!(s.secret.expose(), "s3cret!");
        assert_eq!(s.log_file, PathBuf::from("logs/mailgate.log"));
        assert!(!s.debug);
        assert!(s.log_to_stdout);
        assert!(s.use_json);
        assert!(matches!(s.transport.method, TransportMethod::Sendmail { command: None }));
        assert_eq!(s.transport.timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_section_is_fatal() {
        let ini = BASE.replace("[Output]\nUseJSON = 1\n", "");
        assert!(matches!(Settings::from_ini_str(&ini), Err(ConfigError::Load(_))));
    }

    #[test]
    fn unknown_flag_token_is_rejected() {
        let ini = BASE.replace("AllowToOverride = 1", "AllowToOverride = maybe");
        let err = Settings::from_ini_str(&ini).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { key: "MailSettings.AllowToOverride", .. }));
    }

    #[test]
    fn invalid_default_recipient_is_rejected() {
        let ini = BASE.replace("DefaultMailTo = admin@example.com", "DefaultMailTo = nobody");
        assert!(matches!(
            Settings::from_ini_str(&ini),
            Err(ConfigError::InvalidAddress { key: "DefaultValues.DefaultMailTo", .. })
        ));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let ini = BASE.replace("SecretWord = s3cret!", "SecretWord =");
        assert!(matches!(Settings::from_ini_str(&ini), Err(ConfigError::Empty(_))));
    }

    #[test]
    fn transport_section_selects_smtp() {
        let ini = format!(
            "{BASE}\n[Transport]\nMethod = SMTP\nSmtpHost = mail.example.com\nSmtpUsername = bot\nSmtpPassword = pw\nTimeoutSeconds = 5\n"
        );
        let s = Settings::from_ini_str(&ini).unwrap();
        match s.transport.method {
            TransportMethod::Smtp { host, port, username, password } => {
                assert_eq!(host, "mail.example.com");
                assert_eq!(port, 587);
                assert_eq!(username, "bot");
                assert_eq!(password.expose(), "pw");
            }
            other => panic!("unexpected transport {other:?}"),
        }
        assert_eq!(s.transport.timeout, Duration::from_secs(5));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let ini = format!("{BASE}\n[Transport]\nMethod = pigeon\n");
        assert!(matches!(Settings::from_ini_str(&ini), Err(ConfigError::UnknownTransport(m)) if m == "pigeon"));
    }

    #[test]
    fn flags_accept_known_tokens_only() {
        for t in ["1", "true", "Yes", " ON "] {
            assert!(parse_flag("k", t).unwrap());
        }
        for f in ["0", "false", "NO", "off"] {
            assert!(!parse_flag("k", f).unwrap());
        }
        assert!(parse_flag("k", "").is_err());
        assert!(parse_flag("k", "2").is_err());
    }

    #[test]
    fn escaped_or_quoted_secret_is_rejected() {
        for written in ["a\\b", "\"quoted\"", "back\\\\slash"] {
            let ini = BASE.replace("SecretWord = s3cret!", &format!("SecretWord = {written}"));
            assert!(
                matches!(Settings::from_ini_str(&ini), Err(ConfigError::Rewritten("Security.SecretWord"))),
                "{written}"
            );
        }
    }

    #[test]
    fn secret_with_comment_markers_is_kept_verbatim() {
        for written in ["ab#cd", "ab;cd", "p@ss:w0rd!"] {
            let ini = BASE.replace("SecretWord = s3cret!", &format!("SecretWord = {written}"));
            assert_eq!(Settings::from_ini_str(&ini).unwrap().secret.expose(), written);
        }
    }

    #[test]
    fn trailing_comments_are_ignored_on_flags_and_numbers() {
        let ini = BASE
            .replace("UseJSON = 1", "UseJSON = 1   ; comment")
            .replace("DebugMode = 0", "DebugMode = 0 # off in prod");
        let ini = format!("{ini}\n[Transport]\nMethod = stub ; dry run\nTimeoutSeconds = 10 ; seconds\n");
        let s = Settings::from_ini_str(&ini).unwrap();
        assert!(s.use_json);
        assert!(!s.debug);
        assert!(matches!(s.transport.method, TransportMethod::Stub));
        assert_eq!(s.transport.timeout, Duration::from_secs(10));
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let path = std::env::temp_dir().join("mailgate-does-not-exist.ini");
        assert!(matches!(Settings::load(&path), Err(ConfigError::Load(_))));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("mailgate-{}.ini", std::process::id()));
        std::fs::write(&path, BASE).unwrap();
        let s = Settings::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(s.unwrap().secret.expose(), "s3cret!");
    }

    #[test]
    fn inline_comment_markers_need_leading_space() {
        assert_eq!(strip_inline_comment("1 ; note"), "1");
        assert_eq!(strip_inline_comment("1\t# note"), "1");
        assert_eq!(strip_inline_comment("ab;cd"), "ab;cd");
        assert_eq!(strip_inline_comment("1"), "1");
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = Settings::from_ini_str(BASE).unwrap();
        assert!(!format!("{s:?}").contains("s3cret!"));
    }
}
