use super::directory::check_name;
use super::PathTokens;
use crate::filesystem::Filesystem;
use crate::structs::*;
use crate::Error;

impl PathTokens {
    /// Split an absolute path into its components
    pub fn parse(path: &str) -> Result<Self, Error> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        let tokens: Vec<String> = path
            .split('/')
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        for token in &tokens {
            check_name(token.as_bytes())?;
        }
        Ok(Self { tokens })
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Final component
    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Path of the directory holding the final component
    pub fn parent(&self) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.pop();
        Self { tokens }
    }
}

impl std::fmt::Display for PathTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tokens.is_empty() {
            return write!(f, "/");
        }
        for token in &self.tokens {
            write!(f, "/{token}")?;
        }
        Ok(())
    }
}

impl Filesystem {
    /// Inode and entry type `path` leads to from the root
    pub fn resolve(&mut self, path: &PathTokens) -> Result<Option<(u32, FileType)>, Error> {
        let mut current = (ROOT_INODE, FileType::Directory);
        for token in &path.tokens {
            if current.1 != FileType::Directory {
                return Ok(None);
            }
            match self.find_by_name(current.0, token.as_bytes())? {
                Some(found) => current = (found.inode(), found.file_type()),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Inode of the directory `path` leads to
    pub fn resolve_dir(&mut self, path: &PathTokens) -> Result<Option<u32>, Error> {
        Ok(match self.resolve(path)? {
            Some((index, FileType::Directory)) => Some(index),
            _ => None,
        })
    }
}
