use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::key::TransferKey;

pub const DEFAULT_KEYFILE: &str = "keyfile.txt";
pub const DEFAULT_PROJ_ID: u8 = b'a';
pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_OUTPUT: &str = "recvfile";

/// Settings both processes must agree on, plus the consumer's output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub keyfile: PathBuf,
    pub proj_id: u8,
    pub capacity: usize,
    pub output: PathBuf,
}

impl TransferConfig {
    pub fn keyfile<P: AsRef<Path>>(mut self, keyfile: P) -> Self {
        self.keyfile = keyfile.as_ref().to_path_buf();
        self
    }

    pub fn proj_id(mut self, proj_id: u8) -> Self {
        self.proj_id = proj_id;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn output<P: AsRef<Path>>(mut self, output: P) -> Self {
        self.output = output.as_ref().to_path_buf();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config(String::from("capacity must be at least one byte")));
        }
        if u32::try_from(self.capacity).is_err() {
            return Err(Error::Config(format!(
                "capacity {} does not fit the 32-bit chunk size field",
                self.capacity
            )));
        }
        if self.proj_id == 0 {
            return Err(Error::Config(String::from("project id must be non-zero")));
        }
        Ok(())
    }

    pub fn key(&self) -> Result<TransferKey> {
        TransferKey::derive(&self.keyfile, self.proj_id)
    }
}

/// Command-line flags shared by both binaries. Both sides must pass the same
/// values to meet on the same resources.
#[derive(clap::Args, Debug, Clone)]
pub struct ChannelArgs {
    /// File whose identity seeds the IPC key; it must already exist.
    #[arg(long, default_value = DEFAULT_KEYFILE)]
    pub keyfile: PathBuf,

    /// Project id mixed into the IPC key.
    #[arg(long, default_value_t = DEFAULT_PROJ_ID as char)]
    pub proj_id: char,

    /// Shared buffer size in bytes.
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,
}

impl ChannelArgs {
    pub fn apply(&self, config: TransferConfig) -> Result<TransferConfig> {
        let proj_id = u8::try_from(self.proj_id).map_err(|_| {
            Error::Config(format!("project id {:?} is not a single byte", self.proj_id))
        })?;
        let config = config
            .keyfile(&self.keyfile)
            .proj_id(proj_id)
            .capacity(self.capacity);
        config.validate()?;
        Ok(config)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            keyfile: PathBuf::from(DEFAULT_KEYFILE),
            proj_id: DEFAULT_PROJ_ID,
            capacity: DEFAULT_CAPACITY,
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.keyfile, Path::new("keyfile.txt"));
        assert_eq!(config.proj_id, b'a');
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.output, Path::new("recvfile"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unrepresentable_capacity() {
        assert!(TransferConfig::default().capacity(0).validate().is_err());
        let huge = TransferConfig::default().capacity(u32::MAX as usize + 1);
        assert!(matches!(huge.validate(), Err(Error::Config(_))));
        assert!(TransferConfig::default().proj_id(0).validate().is_err());
    }

    #[test]
    fn args_override_defaults() {
        let args = ChannelArgs {
            keyfile: PathBuf::from("/tmp/k"),
            proj_id: 'z',
            capacity: 4096,
        };
        let config = args.apply(TransferConfig::default()).unwrap();
        assert_eq!(config.keyfile, Path::new("/tmp/k"));
        assert_eq!(config.proj_id, b'z');
        assert_eq!(config.capacity, 4096);
        assert_eq!(config.output, Path::new(DEFAULT_OUTPUT));

        let wide = ChannelArgs {
            proj_id: 'λ',
            ..args
        };
        assert!(wide.apply(TransferConfig::default()).is_err());
    }
}
