#![allow(dead_code)]

pub mod temp_files {
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    /// Temporary directory tree; removed when dropped.
    pub struct TempTree {
        dir: TempDir,
    }

    impl TempTree {
        pub fn new() -> Self {
            Self {
                dir: tempfile::Builder::new()
                    .prefix("nsr_test_")
                    .tempdir()
                    .unwrap(),
            }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        /// Write `content` at `rel`, creating parent directories.
        pub fn file(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            path
        }

        pub fn mkdir(&self, rel: &str) -> PathBuf {
            let path = self.dir.path().join(rel);
            std::fs::create_dir_all(&path).unwrap();
            path
        }
    }
}

pub mod fixtures {
    use std::sync::Arc;

    use nsrouter::dispatcher::Dispatcher;
    use nsrouter::namespace::NamespaceBuilder;
    use nsrouter::Registry;

    pub fn dispatcher(ns: NamespaceBuilder) -> Dispatcher {
        Dispatcher::new(Arc::new(Registry::new(ns.build().unwrap())))
    }
}
