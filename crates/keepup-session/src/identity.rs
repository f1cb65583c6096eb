//! OS user resolution.

use std::path::PathBuf;

use uzers::os::unix::UserExt;

/// The OS identity a managed server runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Looks up OS users by name.
pub trait UserResolver: Send + Sync {
    /// Returns `None` if no such user exists.
    fn resolve(&self, name: &str) -> Option<Identity>;
}

/// Resolver backed by the system user database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUsers;

impl UserResolver for SystemUsers {
    fn resolve(&self, name: &str) -> Option<Identity> {
        let user = uzers::get_user_by_name(name)?;
        Some(Identity {
            name: name.to_string(),
            uid: user.uid(),
            gid: user.primary_group_id(),
            home: user.home_dir().to_path_buf(),
        })
    }
}
