use super::heap::RuntimeError;
use crate::{
    ffi::{self, NativeEnv},
    handle::{NativeInt, ObjectHandle},
    mangle,
};
use dashmap::DashMap;
use libffi::middle::{CodePtr, Type};
use libloading::{Library, Symbol};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Unable to find library '{0}'")]
    LibraryNotFound(String),
    #[error("Unable to find entry point '{1}' in library '{0}'")]
    SymbolNotFound(String, String),
    #[error("Failed to load library '{0}': {1}")]
    LoadError(String, String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeKind {
    /// `()V`, writes a diagnostic line.
    Diagnostic,
    /// `()J`, returns the address as an integer.
    Query,
}

impl NativeKind {
    pub fn descriptor(self) -> &'static str {
        match self {
            NativeKind::Diagnostic => "()V",
            NativeKind::Query => "()J",
        }
    }

    pub(crate) fn return_type(self) -> Type {
        match self {
            NativeKind::Diagnostic => Type::void(),
            NativeKind::Query => Type::isize(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeReturn {
    Void,
    Int(NativeInt),
}

/// A managed method declared `native`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeMethod {
    /// Library that should provide the symbol, if it is not registered in-process.
    pub library: Option<String>,
    pub class: String,
    pub name: String,
    pub kind: NativeKind,
}

impl NativeMethod {
    pub fn new(class: impl Into<String>, name: impl Into<String>, kind: NativeKind) -> Self {
        Self {
            library: None,
            class: class.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn in_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Symbol names to try, most specific last.
    pub fn symbol_candidates(&self) -> Vec<String> {
        let mut names = vec![mangle::short_name(&self.class, &self.name)];
        names.extend(mangle::long_name(&self.class, &self.name, self.kind.descriptor()));
        names
    }
}

type RawFn = unsafe extern "C" fn();

/// Loaded native libraries plus symbols registered from the current process.
pub struct NativeLibraries {
    root: PathBuf,
    libraries: DashMap<String, Library>,
    statics: DashMap<String, RawFn>,
}

impl NativeLibraries {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            libraries: DashMap::new(),
            statics: DashMap::new(),
        }
    }

    /// Registers an in-process function under its exported symbol name.
    ///
    /// # Safety
    ///
    /// `code` must have the signature of the native method it will be bound to.
    pub unsafe fn register(&self, symbol: impl Into<String>, code: RawFn) {
        self.statics.insert(symbol.into(), code);
    }

    /// Registers this crate's own exported native methods.
    pub fn register_builtins(&self) {
        let print: unsafe extern "system" fn(*mut NativeEnv, ObjectHandle) =
            ffi::Java_MyClass_printNativeAddress;
        let query: unsafe extern "system" fn(*mut NativeEnv, ObjectHandle) -> NativeInt =
            ffi::Java_MyClass_getNativeAddress;
        // SAFETY: both are only ever called through a Cif built from their NativeKind
        unsafe {
            self.register(
                "Java_MyClass_printNativeAddress",
                std::mem::transmute::<_, RawFn>(print),
            );
            self.register(
                "Java_MyClass_getNativeAddress",
                std::mem::transmute::<_, RawFn>(query),
            );
        }
    }

    fn find_library_path(&self, name: &str) -> Option<PathBuf> {
        let exact = self.root.join(name);
        if exact.exists() {
            return Some(exact);
        }

        let file_name = libloading::library_filename(name);
        let platform = self.root.join(&file_name);
        if platform.exists() {
            return Some(platform);
        }

        // Versioned search
        let prefix = file_name.to_string_lossy().into_owned();
        self.root
            .read_dir()
            .ok()?
            .filter_map(Result::ok)
            .find(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
    }

    pub fn get_library(
        &self,
        name: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Library>, InvokeError> {
        if let Some(lib) = self.libraries.get(name) {
            return Ok(lib);
        }

        let path = self
            .find_library_path(name)
            .ok_or_else(|| InvokeError::LibraryNotFound(name.to_string()))?;
        debug!("loading native library '{}' from {:?}", name, path);

        let lib = unsafe { Library::new(&path) }
            .map_err(|e| InvokeError::LoadError(name.to_string(), e.to_string()))?;
        self.libraries.entry(name.to_string()).or_insert(lib);
        self.libraries
            .get(name)
            .ok_or_else(|| InvokeError::LibraryNotFound(name.to_string()))
    }

    pub fn get_function(&self, library: &str, name: &str) -> Result<CodePtr, InvokeError> {
        let l = self.get_library(library)?;
        let sym: Symbol<RawFn> = unsafe { l.get(name.as_bytes()) }
            .map_err(|_| InvokeError::SymbolNotFound(library.to_string(), name.to_string()))?;
        Ok(CodePtr::from_fun(*sym))
    }

    /// Binds a native method: registered symbols first, then the method's library.
    pub fn bind(&self, method: &NativeMethod) -> Result<CodePtr, InvokeError> {
        let candidates = method.symbol_candidates();
        for symbol in &candidates {
            if let Some(code) = self.statics.get(symbol) {
                trace!("bound {}.{} to registered symbol {}", method.class, method.name, symbol);
                return Ok(CodePtr::from_fun(*code));
            }
        }

        let Some(library) = &method.library else {
            return Err(InvokeError::SymbolNotFound(
                "<process>".to_string(),
                candidates[0].clone(),
            ));
        };
        let mut last_err = None;
        for symbol in &candidates {
            match self.get_function(library, symbol) {
                Ok(code) => return Ok(code),
                Err(e @ InvokeError::SymbolNotFound(..)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            InvokeError::SymbolNotFound(library.clone(), candidates[0].clone())
        }))
    }
}
