//! Cross-instance attachment links
//!
//! A link grafts one instance's tree under another's. The parent side owns a
//! *placeholder* handle in the reserved link namespace; the child side owns
//! its real root handle. The two sides never talk directly - each registers
//! its half against one token pair (exchanged out of band), and once both
//! halves are present the registry exposes the pairing as a plain
//! `placeholder -> child root` map entry.
//!
//! Registration and teardown may happen on any thread. All mutation is
//! expressed as events on a channel drained only while holding the registry
//! lock, and every triggering call drains before returning: the map is
//! up to date the moment `export`/`import`/release returns, and no re-entrant
//! callback can ever observe half-applied state. Readers copy the map out
//! under the same lock instead of iterating live state.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::TransformHandle;
use thiserror::Error;

/// Errors from link registration
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("export side of link token {0} is already bound")]
    ExportAlreadyBound(u64),

    #[error("import side of link token {0} is already bound")]
    ImportAlreadyBound(u64),
}

/// One half of a single-use capability token pair
///
/// Both halves carry the same pairing id; how they travel between instances
/// is the transport's business, not the registry's. Tokens are consumed by
/// registration and cannot be cloned.
#[derive(Debug)]
pub struct LinkToken {
    id: u64,
}

impl LinkToken {
    /// Mint a fresh token pair
    pub fn pair() -> (LinkToken, LinkToken) {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        (LinkToken { id }, LinkToken { id })
    }

    /// The pairing id shared by both halves
    pub fn id(&self) -> u64 {
        self.id
    }
}

enum LinkEvent {
    Export {
        token: u64,
        placeholder: TransformHandle,
    },
    Import {
        token: u64,
        child_root: TransformHandle,
    },
    Invalidate {
        token: u64,
    },
}

struct LinkTables {
    rx: Receiver<LinkEvent>,
    /// Export halves waiting for their partner
    pending_exports: HashMap<u64, TransformHandle>,
    /// Import halves waiting for their partner
    pending_imports: HashMap<u64, TransformHandle>,
    /// Token id of each resolved pairing, for teardown lookup
    resolved_tokens: HashMap<u64, TransformHandle>,
    /// The map the consumer reads: placeholder -> child root
    resolved: HashMap<TransformHandle, TransformHandle>,
}

impl LinkTables {
    /// Apply every queued event; called only while the lock is held
    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Export { token, placeholder } => {
                self.pending_exports.insert(token, placeholder);
                self.try_resolve(token);
            }
            LinkEvent::Import { token, child_root } => {
                self.pending_imports.insert(token, child_root);
                self.try_resolve(token);
            }
            LinkEvent::Invalidate { token } => {
                self.pending_exports.remove(&token);
                self.pending_imports.remove(&token);
                if let Some(placeholder) = self.resolved_tokens.remove(&token) {
                    self.resolved.remove(&placeholder);
                    log::debug!("link {token} torn down ({placeholder:?})");
                }
            }
        }
    }

    fn try_resolve(&mut self, token: u64) {
        if !self.pending_exports.contains_key(&token) || !self.pending_imports.contains_key(&token)
        {
            return;
        }
        let placeholder = self.pending_exports.remove(&token).expect("checked above");
        let child_root = self.pending_imports.remove(&token).expect("checked above");
        self.resolved_tokens.insert(token, placeholder);
        self.resolved.insert(placeholder, child_root);
        log::debug!("link {token} resolved: {placeholder:?} -> {child_root:?}");
    }

    fn export_bound(&self, token: u64) -> bool {
        self.pending_exports.contains_key(&token) || self.resolved_tokens.contains_key(&token)
    }

    fn import_bound(&self, token: u64) -> bool {
        self.pending_imports.contains_key(&token) || self.resolved_tokens.contains_key(&token)
    }
}

struct LinkShared {
    tx: Sender<LinkEvent>,
    tables: Mutex<LinkTables>,
}

impl LinkShared {
    fn send_and_drain(&self, event: LinkEvent) {
        // The receiver lives inside the tables, so the channel can never be
        // disconnected while `self` is alive.
        let _ = self.tx.send(event);
        self.tables.lock().drain_events();
    }
}

/// Process-wide registry of cross-instance attachment links
///
/// Cheap to clone; all clones share one set of tables.
#[derive(Clone)]
pub struct LinkRegistry {
    shared: Arc<LinkShared>,
}

impl LinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(LinkShared {
                tx,
                tables: Mutex::new(LinkTables {
                    rx,
                    pending_exports: HashMap::new(),
                    pending_imports: HashMap::new(),
                    resolved_tokens: HashMap::new(),
                    resolved: HashMap::new(),
                }),
            }),
        }
    }

    /// Register the parent side: offer a placeholder handle for attachment
    ///
    /// `placeholder` must live in the reserved link namespace (contract).
    /// The pairing appears in the resolved map as soon as the matching import
    /// arrives; dropping or releasing the returned binding tears it down.
    pub fn export(
        &self,
        token: LinkToken,
        placeholder: TransformHandle,
    ) -> Result<ExportBinding, LinkError> {
        assert!(
            placeholder.is_placeholder(),
            "export handle {placeholder:?} is not in the link namespace"
        );

        {
            let mut tables = self.shared.tables.lock();
            tables.drain_events();
            if tables.export_bound(token.id) {
                return Err(LinkError::ExportAlreadyBound(token.id));
            }
            let _ = self.shared.tx.send(LinkEvent::Export {
                token: token.id,
                placeholder,
            });
            tables.drain_events();
        }

        Ok(ExportBinding {
            shared: Arc::clone(&self.shared),
            token: Some(token.id),
            placeholder,
        })
    }

    /// Register the child side: supply the local root to attach
    pub fn import(
        &self,
        token: LinkToken,
        child_root: TransformHandle,
    ) -> Result<ImportBinding, LinkError> {
        {
            let mut tables = self.shared.tables.lock();
            tables.drain_events();
            if tables.import_bound(token.id) {
                return Err(LinkError::ImportAlreadyBound(token.id));
            }
            let _ = self.shared.tx.send(LinkEvent::Import {
                token: token.id,
                child_root,
            });
            tables.drain_events();
        }

        Ok(ImportBinding {
            shared: Arc::clone(&self.shared),
            token: Some(token.id),
            child_root,
        })
    }

    /// A point-in-time copy of the resolved map (`placeholder -> child root`)
    pub fn resolved_links(&self) -> HashMap<TransformHandle, TransformHandle> {
        let mut tables = self.shared.tables.lock();
        tables.drain_events();
        tables.resolved.clone()
    }

    /// Number of half-registered links still waiting for a partner
    pub fn pending_count(&self) -> usize {
        let mut tables = self.shared.tables.lock();
        tables.drain_events();
        tables.pending_exports.len() + tables.pending_imports.len()
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Live parent-side registration; tears the link down when dropped
pub struct ExportBinding {
    shared: Arc<LinkShared>,
    token: Option<u64>,
    placeholder: TransformHandle,
}

impl ExportBinding {
    /// The placeholder handle this binding offered
    pub fn placeholder(&self) -> TransformHandle {
        self.placeholder
    }

    /// Tear the link down now instead of at drop time
    pub fn release(mut self) {
        self.invalidate();
    }

    fn invalidate(&mut self) {
        if let Some(token) = self.token.take() {
            self.shared.send_and_drain(LinkEvent::Invalidate { token });
        }
    }
}

impl Drop for ExportBinding {
    fn drop(&mut self) {
        self.invalidate();
    }
}

/// Live child-side registration; tears the link down when dropped
pub struct ImportBinding {
    shared: Arc<LinkShared>,
    token: Option<u64>,
    child_root: TransformHandle,
}

impl ImportBinding {
    /// The child root this binding supplied
    pub fn child_root(&self) -> TransformHandle {
        self.child_root
    }

    /// Tear the link down now instead of at drop time
    pub fn release(mut self) {
        self.invalidate();
    }

    fn invalidate(&mut self) {
        if let Some(token) = self.token.take() {
            self.shared.send_and_drain(LinkEvent::Invalidate { token });
        }
    }
}

impl Drop for ImportBinding {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::InstanceId;

    fn placeholder(n: u64) -> TransformHandle {
        TransformHandle::new(InstanceId::LINK, n)
    }

    fn root(instance: u64) -> TransformHandle {
        TransformHandle::new(InstanceId::from_raw(instance), 0)
    }

    #[test]
    fn test_resolution_requires_both_sides() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();

        let _export = registry.export(parent_token, placeholder(1)).unwrap();
        assert!(registry.resolved_links().is_empty());
        assert_eq!(registry.pending_count(), 1);

        let _import = registry.import(child_token, root(2)).unwrap();
        let links = registry.resolved_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[&placeholder(1)], root(2));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_resolution_order_independent() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();

        let _import = registry.import(child_token, root(2)).unwrap();
        assert!(registry.resolved_links().is_empty());

        let _export = registry.export(parent_token, placeholder(1)).unwrap();
        assert_eq!(registry.resolved_links()[&placeholder(1)], root(2));
    }

    #[test]
    fn test_drop_tears_down_synchronously() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();

        let export = registry.export(parent_token, placeholder(1)).unwrap();
        let _import = registry.import(child_token, root(2)).unwrap();
        assert_eq!(registry.resolved_links().len(), 1);

        drop(export);
        // The entry is gone before drop returns, not at some later drain.
        assert!(registry.resolved_links().is_empty());
    }

    #[test]
    fn test_release_once_then_drop_is_quiet() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();

        let export = registry.export(parent_token, placeholder(1)).unwrap();
        let import = registry.import(child_token, root(2)).unwrap();

        import.release();
        assert!(registry.resolved_links().is_empty());

        // The surviving half never re-resolves on a dead token.
        drop(export);
        assert!(registry.resolved_links().is_empty());
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_double_export_rejected() {
        let registry = LinkRegistry::new();
        let (a, b) = LinkToken::pair();

        let _export = registry.export(a, placeholder(1)).unwrap();
        assert!(matches!(
            registry.export(b, placeholder(2)),
            Err(LinkError::ExportAlreadyBound(_))
        ));
    }

    #[test]
    #[should_panic(expected = "link namespace")]
    fn test_export_requires_link_namespace() {
        let registry = LinkRegistry::new();
        let (token, _other) = LinkToken::pair();
        let _ = registry.export(token, root(3));
    }

    #[test]
    fn test_reader_copy_outlives_teardown() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();
        let export = registry.export(parent_token, placeholder(1)).unwrap();
        let _import = registry.import(child_token, root(2)).unwrap();

        let copy = registry.resolved_links();
        drop(export);

        assert_eq!(copy[&placeholder(1)], root(2));
        assert!(registry.resolved_links().is_empty());
    }

    #[test]
    fn test_two_links_to_same_child_root() {
        let registry = LinkRegistry::new();
        let (pa, ca) = LinkToken::pair();
        let (pb, cb) = LinkToken::pair();

        // The same content can be grafted at two distinct placeholders.
        let _ea = registry.export(pa, placeholder(1)).unwrap();
        let _eb = registry.export(pb, placeholder(2)).unwrap();
        let _ia = registry.import(ca, root(2)).unwrap();
        let _ib = registry.import(cb, root(2)).unwrap();

        let links = registry.resolved_links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[&placeholder(1)], root(2));
        assert_eq!(links[&placeholder(2)], root(2));
    }

    #[test]
    fn test_registration_from_other_threads() {
        let registry = LinkRegistry::new();
        let (parent_token, child_token) = LinkToken::pair();

        let r = registry.clone();
        let exporter = std::thread::spawn(move || r.export(parent_token, placeholder(1)).unwrap());
        let r = registry.clone();
        let importer = std::thread::spawn(move || r.import(child_token, root(2)).unwrap());

        let _export = exporter.join().unwrap();
        let _import = importer.join().unwrap();

        assert_eq!(registry.resolved_links()[&placeholder(1)], root(2));
    }
}
