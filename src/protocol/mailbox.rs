//! File-per-message agent mailboxes.
//!
//! Layout under the mailbox root:
//! - inbox/<agent>/  : one `<id>.json` file per pending envelope
//! - outbox/<agent>/ : created alongside the inbox, never written here
//!
//! Any number of processes may deposit into an inbox at once: every envelope
//! lands in its own file named by its unique id. Draining assumes a single
//! reader; two concurrent drains of the same inbox can both deliver a file
//! before either removes it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::envelope::Envelope;
use super::ENVELOPE_EXTENSION;
use crate::error::{Error, Result};

/// Inbox directory name.
pub const INBOX_DIR: &str = "inbox";

/// Outbox directory name.
pub const OUTBOX_DIR: &str = "outbox";

/// Suffix of envelopes still being written.
const PARTIAL_SUFFIX: &str = "tmp";

/// Suffix given to stored files that failed to parse during a destructive drain.
pub const CORRUPT_SUFFIX: &str = "corrupt";

/// Durable store of per-agent inboxes rooted at an explicit directory.
#[derive(Debug, Clone)]
pub struct Mailbox {
    root: PathBuf,
}

/// Result of draining an inbox.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Envelopes read, ordered by id.
    pub envelopes: Vec<Envelope>,
    /// Per-entry failures. Unreadable files stay in place; corrupt ones are
    /// set aside as `<name>.corrupt` by a destructive drain.
    pub errors: Vec<Error>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

impl Mailbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbox_dir(&self, agent: &str) -> Result<PathBuf> {
        validate_agent_name(agent)?;
        Ok(self.root.join(INBOX_DIR).join(agent))
    }

    pub fn outbox_dir(&self, agent: &str) -> Result<PathBuf> {
        validate_agent_name(agent)?;
        Ok(self.root.join(OUTBOX_DIR).join(agent))
    }

    /// Create the inbox and outbox directories of an agent if missing.
    pub fn ensure_directories(&self, agent: &str) -> Result<()> {
        for dir in [self.inbox_dir(agent)?, self.outbox_dir(agent)?] {
            if !dir.is_dir() {
                fs::create_dir_all(&dir)
                    .map_err(|e| Error::filesystem("create mailbox directory", agent, &dir, e))?;
                tracing::debug!("Created mailbox directory: {}", dir.display());
            }
        }
        Ok(())
    }

    /// Write an envelope into the recipient's inbox and return its id.
    ///
    /// The recipient's directories are created on demand. The envelope is
    /// written under a temporary name and then linked into place, so readers
    /// only ever see complete files. An envelope whose id is already pending
    /// in the inbox is refused with an `AlreadyExists` filesystem error.
    pub fn deposit(&self, recipient: &str, envelope: &Envelope) -> Result<String> {
        self.ensure_directories(recipient)?;

        let inbox = self.inbox_dir(recipient)?;
        let file_path = inbox.join(envelope.file_name());
        let partial_path = inbox.join(format!("{}.{}", envelope.file_name(), PARTIAL_SUFFIX));

        // Write the full body under a name drain ignores
        let content = serde_json::to_string_pretty(envelope)?;
        fs::write(&partial_path, content)
            .map_err(|e| Error::filesystem("deposit", recipient, &partial_path, e))?;

        // Publish with a hard link: unlike rename it fails instead of
        // replacing an existing envelope with the same id
        let published = fs::hard_link(&partial_path, &file_path);
        let _ = fs::remove_file(&partial_path);
        if let Err(e) = published {
            if e.kind() == ErrorKind::AlreadyExists {
                tracing::warn!("Message id {} already pending for {}", envelope.id, recipient);
            }
            return Err(Error::filesystem("deposit", recipient, &file_path, e));
        }

        tracing::debug!("Deposited message {} from {} to {}", envelope.id, envelope.from, recipient);
        Ok(envelope.id.clone())
    }

    /// Read every pending envelope in an agent's inbox.
    ///
    /// With `delete_after_read`, each file is removed right after it has been
    /// parsed, one at a time. A file that cannot be read or parsed is reported
    /// in [`DrainReport::errors`]; the rest of the inbox is still delivered.
    /// On a destructive drain an unparsable file is kept but renamed to
    /// `<name>.corrupt`, so it is no longer pending. A missing inbox drains
    /// to nothing.
    pub fn drain(&self, agent: &str, delete_after_read: bool) -> Result<DrainReport> {
        let inbox = self.inbox_dir(agent)?;
        let mut report = DrainReport::default();

        if !inbox.exists() {
            return Ok(report);
        }

        for path in list_envelope_files(agent, &inbox)? {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Message vanished before read: {}", path.display());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable message {}: {}", path.display(), e);
                    report.errors.push(Error::filesystem("read message", agent, &path, e));
                    continue;
                }
            };

            let envelope: Envelope = match serde_json::from_str(&content) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Skipping malformed message {}: {}", path.display(), e);
                    if delete_after_read {
                        quarantine(&path);
                    }
                    report.errors.push(Error::Parse { path, source: e });
                    continue;
                }
            };

            // Remove each file as soon as it is read so a crash mid-drain
            // only loses what was already delivered
            if delete_after_read {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("Failed to remove read message {}: {}", path.display(), e);
                    report.errors.push(Error::filesystem("remove message", agent, &path, e));
                }
            }

            report.envelopes.push(envelope);
        }

        tracing::debug!(
            "Drained {} message(s) for {} ({} skipped)",
            report.envelopes.len(),
            agent,
            report.errors.len()
        );
        Ok(report)
    }

    /// Number of envelope files waiting in an agent's inbox.
    pub fn pending_count(&self, agent: &str) -> Result<usize> {
        let inbox = self.inbox_dir(agent)?;
        if !inbox.exists() {
            return Ok(0);
        }
        Ok(list_envelope_files(agent, &inbox)?.len())
    }
}

/// Move an unparsable envelope file out of the pending set, keeping its bytes.
fn quarantine(path: &Path) {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(CORRUPT_SUFFIX);

    match fs::rename(path, &target) {
        Ok(()) => tracing::debug!("Moved malformed message to {}", Path::new(&target).display()),
        Err(e) => tracing::warn!("Failed to set aside malformed message {}: {}", path.display(), e),
    }
}

/// Envelope files in an inbox, sorted by file name (and so by id).
fn list_envelope_files(agent: &str, inbox: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(inbox).map_err(|e| Error::filesystem("list inbox", agent, inbox, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem("list inbox", agent, inbox, e))?;
        let path = entry.path();

        if path.is_file() && path.extension().map_or(false, |ext| ext == ENVELOPE_EXTENSION) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Agent names become directory names, so they must be one plain path
/// component.
fn validate_agent_name(agent: &str) -> Result<()> {
    let mut components = Path::new(agent).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if agent.is_empty() || !single_normal || agent.contains(['/', '\\']) {
        return Err(Error::InvalidAgentName(agent.to_string()));
    }
    Ok(())
}
