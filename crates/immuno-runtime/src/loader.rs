//! Shared-library loading and plugin directory scanning.

use std::ffi::c_void;
use std::fs::ReadDir;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Failed(String),
}

/// An open shared library. Dropping it closes the library.
pub trait SharedLibrary {
    /// Address of an exported symbol.
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;

    fn close(self) -> Result<(), LoaderError>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

/// The operating-system services the plugin manager depends on.
pub trait Platform {
    type Library: SharedLibrary;
    /// Directory entries. Dropping the iterator closes the directory.
    type Entries: Iterator<Item = PathBuf>;

    fn open_library(&self, path: &Path) -> Result<Self::Library, LoaderError>;

    /// Fails with [`LoaderError::NotFound`] when `path` does not exist.
    fn open_dir(&self, path: &Path) -> Result<Self::Entries, LoaderError>;
}

/// `libloading` and `std::fs` backed platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePlatform;

#[derive(Debug)]
pub struct NativeLibrary(Library);

impl SharedLibrary for NativeLibrary {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is read as a bare address; callers cast it to the ABI type that is
        // documented for `name`.
        let symbol = unsafe { self.0.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }

    fn close(self) -> Result<(), LoaderError> {
        self.0
            .close()
            .map_err(|error| LoaderError::Failed(error.to_string()))
    }
}

#[derive(Debug)]
pub struct NativeEntries(ReadDir);

impl Iterator for NativeEntries {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.0.next()? {
                Ok(entry) => return Some(entry.path()),
                Err(error) => {
                    tracing::warn!("skipping unreadable plugin directory entry: {error}");
                }
            }
        }
    }
}

impl Platform for NativePlatform {
    type Library = NativeLibrary;
    type Entries = NativeEntries;

    fn open_library(&self, path: &Path) -> Result<Self::Library, LoaderError> {
        // SAFETY: Loading a foreign library runs its initializers; plugins are trusted code.
        unsafe { Library::new(path) }
            .map(NativeLibrary)
            .map_err(|error| LoaderError::Failed(error.to_string()))
    }

    fn open_dir(&self, path: &Path) -> Result<Self::Entries, LoaderError> {
        match std::fs::read_dir(path) {
            Ok(entries) => Ok(NativeEntries(entries)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Err(LoaderError::NotFound),
            Err(error) => Err(LoaderError::Failed(error.to_string())),
        }
    }
}
