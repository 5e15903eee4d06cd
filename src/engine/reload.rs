// src/engine/reload.rs

//! Reload handling: watcher notices and explicit reloads.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::orchestrator::Inner;
use super::state::{LoadedTest, LoaderState};
use super::ChangeNotice;
use crate::errors::LoaderError;
use crate::events::TestEvent;
use crate::types::same_tree;

impl Inner {
    /// Handle a notification from the change watcher.
    pub(crate) async fn on_change_notice(&self, notice: ChangeNotice) {
        let mut state = self.state.lock().await;

        let current = state.watcher.as_ref().map(|w| w.generation);
        if current != Some(notice.generation) {
            debug!(
                path = %notice.path.display(),
                generation = notice.generation,
                current = ?current,
                "dropping change notice from a stale watcher"
            );
            return;
        }

        info!(path = %notice.path.display(), "test artifact changed");
        self.reload_locked(&mut state, notice.path).await;
    }

    /// Replace the loaded tree with a freshly loaded one.
    ///
    /// `path` names what triggered the reload and is carried by the reload
    /// events: the changed member for watcher notices, the project path
    /// otherwise.
    ///
    /// While a run is in flight this only marks the reload as pending. A
    /// failed reload leaves the previous context and tree installed.
    pub(crate) async fn reload_locked(&self, state: &mut LoaderState, path: PathBuf) {
        if state.is_running() {
            debug!(path = %path.display(), "run in progress; deferring reload");
            state.reload_pending = true;
            return;
        }

        let (Some(project), Some(old_tree)) = (
            state.project.clone(),
            state.loaded.as_ref().map(|l| Arc::clone(&l.tree)),
        ) else {
            debug!("nothing loaded; ignoring reload");
            return;
        };

        self.emit(TestEvent::TestReloading {
            path: path.clone(),
            tree: Arc::clone(&old_tree),
        });

        let (context, tree) = match self.load_context(&project).await {
            Ok(loaded) => loaded,
            Err(err) => {
                let err = match err {
                    LoaderError::TestLoad { path, source } => LoaderError::Reload { path, source },
                    other => other,
                };
                warn!(path = %path.display(), error = %err, "reload failed; keeping previous tests");
                self.emit(TestEvent::TestReloadFailed {
                    path,
                    error: Arc::new(err),
                });
                return;
            }
        };

        let changed = !same_tree(&old_tree, &tree);

        if let Some(old) = state.loaded.take() {
            if let Err(source) = old.context.unload().await {
                warn!(path = %path.display(), error = %source, "failed to unload previous context");
                self.emit(TestEvent::TestUnloadFailed {
                    path: path.clone(),
                    error: Arc::new(LoaderError::Unload {
                        path: path.clone(),
                        source,
                    }),
                });
            }
        }

        let tree = Arc::new(tree);
        state.loaded = Some(LoadedTest {
            context,
            tree: Arc::clone(&tree),
        });
        state.reload_pending = false;

        if changed {
            info!(path = %path.display(), tests = tree.test_count(), "tests reloaded");
            self.emit(TestEvent::TestReloaded { path, tree });
        } else {
            debug!(path = %path.display(), "reloaded tree is unchanged");
        }
    }
}
