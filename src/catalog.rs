/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: catalog.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 11:48:02
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-04 17:55:30
 */

use crate::archive;
use crate::config::CorpusConfig;
use log::{debug, warn};
use rand::seq::SliceRandom;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One archived message on disk that is eligible for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSource {
    pub path: PathBuf,
    pub compressed: bool,
}

impl MessageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let compressed = archive::is_compressed(&path);
        Self { path, compressed }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Scans a message store for archived mails.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    extension: String,
    max_file_size: u64,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            max_file_size,
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new(&config.root, &config.extension, config.max_file_size)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns a random sample of eligible messages, at most `limit` of them.
    ///
    /// A missing root is not an error, there is just nothing to send.
    pub fn discover(&self, limit: Option<usize>) -> Vec<MessageSource> {
        if !self.root.exists() {
            warn!("Message store {} does not exist", self.root.display());
            return Vec::new();
        }

        let mut found = Vec::new();
        self.scan(&self.root, &mut found);
        debug!(
            "Found {} eligible messages under {}",
            found.len(),
            self.root.display()
        );

        // Different runs should hit different parts of a large store
        found.shuffle(&mut rand::thread_rng());
        if let Some(limit) = limit {
            found.truncate(limit);
        }

        found.into_iter().map(MessageSource::new).collect()
    }

    fn scan(&self, dir: &Path, found: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            // Linked directories are never entered, they may point back up the tree
            if file_type.is_dir() {
                self.scan(&path, found);
                continue;
            }

            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if metadata.is_dir() {
                debug!("Not following linked directory {}", path.display());
            } else if metadata.is_file() && self.is_eligible(&entry.file_name(), metadata.len()) {
                found.push(path);
            }
        }
    }

    fn is_eligible(&self, file_name: &std::ffi::OsStr, size: u64) -> bool {
        file_name.to_string_lossy().contains(self.extension.as_str()) && size <= self.max_file_size
    }
}
