//! Mount lifecycle: prepare, serve, unmount.
//!
//! [`ZooMount::mount`] binds the adapter to a mount point without serving
//! requests yet. [`ZooMount::serve`] runs the request loop on the calling
//! thread until the filesystem is detached, either externally
//! (`fusermount -u`) or through an [`Unmounter`] taken beforehand.

use crate::adapter::ZooFs;
use crate::config::MountConfig;
use crate::filesystem::ZooFuse;
use fuser::{MountOption, Session, SessionUnmounter};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use zoofuse_core::{PathTranslator, TreeGateway, ZnodeStore};

/// Everything a mount is built from.
#[derive(Debug)]
pub struct MountContext<S> {
    /// Connected wire client.
    pub client: S,
    /// Connection string, used to name the mount.
    pub endpoint: String,
    /// Remote path shown as the filesystem root.
    pub root_alias: String,
    /// Local directory to mount on.
    pub mountpoint: PathBuf,
}

/// Kernel mount options for `config`.
pub fn mount_options(config: &MountConfig, endpoint: &str) -> Vec<MountOption> {
    vec![
        MountOption::FSName(format!("zoofuse:{endpoint}")),
        MountOption::Subtype("zoofuse".to_string()),
        MountOption::AutoUnmount,
        MountOption::DefaultPermissions,
        if config.read_write {
            MountOption::RW
        } else {
            MountOption::RO
        },
    ]
}

/// Detaches a mount from another thread.
#[derive(Clone)]
pub struct Unmounter {
    inner: Arc<Mutex<SessionUnmounter>>,
    mountpoint: PathBuf,
}

impl std::fmt::Debug for Unmounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unmounter")
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

impl Unmounter {
    /// Requests the kernel to detach the mount. Open handles are not closed.
    pub fn unmount(&self) -> io::Result<()> {
        info!(mountpoint = %self.mountpoint.display(), "Unmounting");
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("unmounter lock poisoned"))?;
        inner.unmount().inspect_err(|e| {
            error!(mountpoint = %self.mountpoint.display(), error = %e, "Unmount failed");
        })
    }
}

/// A prepared mount.
pub struct ZooMount {
    session: Session<ZooFuse>,
    store: Arc<dyn ZnodeStore>,
    mountpoint: PathBuf,
}

impl std::fmt::Debug for ZooMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZooMount")
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

impl ZooMount {
    /// Mounts the tree under `ctx.root_alias` on `ctx.mountpoint`.
    ///
    /// Requests are not answered until [`serve`](Self::serve) runs.
    pub fn mount<S>(ctx: MountContext<S>, config: MountConfig) -> io::Result<Self>
    where
        S: ZnodeStore + 'static,
    {
        let translator = PathTranslator::new(&ctx.root_alias, &ctx.mountpoint);
        info!(
            root = translator.root(),
            mountpoint = %ctx.mountpoint.display(),
            read_write = config.read_write,
            "Preparing mount"
        );

        let store: Arc<dyn ZnodeStore> = Arc::new(TreeGateway::new(ctx.client, translator));
        let options = mount_options(&config, &ctx.endpoint);
        let fs = ZooFuse::new(ZooFs::new(Arc::clone(&store), config))?;
        let session = Session::new(fs, &ctx.mountpoint, &options)?;

        Ok(Self {
            session,
            store,
            mountpoint: ctx.mountpoint,
        })
    }

    /// Returns a handle that can detach this mount while it is serving.
    pub fn unmounter(&mut self) -> Unmounter {
        Unmounter {
            inner: Arc::new(Mutex::new(self.session.unmount_callable())),
            mountpoint: self.mountpoint.clone(),
        }
    }

    /// Serves requests until unmounted, then closes the remote session.
    pub fn serve(mut self) -> io::Result<()> {
        info!(mountpoint = %self.mountpoint.display(), "Serving filesystem");
        let result = self.session.run();
        drop(self.session);
        self.store.close();
        info!(mountpoint = %self.mountpoint.display(), "Filesystem unmounted");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(options: &[MountOption], wanted: &MountOption) -> bool {
        options.iter().any(|o| o == wanted)
    }

    #[test]
    fn test_read_only_options() {
        let options = mount_options(&MountConfig::default(), "127.0.0.1:2181");
        assert!(has(&options, &MountOption::FSName("zoofuse:127.0.0.1:2181".into())));
        assert!(has(&options, &MountOption::Subtype("zoofuse".into())));
        assert!(has(&options, &MountOption::DefaultPermissions));
        assert!(has(&options, &MountOption::RO));
        assert!(!has(&options, &MountOption::RW));
    }

    #[test]
    fn test_read_write_options() {
        let options = mount_options(&MountConfig::default().read_write(true), "zk:2181");
        assert!(has(&options, &MountOption::RW));
        assert!(!has(&options, &MountOption::RO));
    }
}
