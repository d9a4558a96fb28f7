use std::fmt;

use crate::constants::{Command, COMMAND_LEN, COMMAND_TYPE, PRODUCT_ID};
use crate::decoding::checksum;

/// A ready-to-write command: `[product, type, code, data2, data3, xor]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; COMMAND_LEN]);

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn code(&self) -> u8 {
        self.0[2]
    }

    pub fn checksum(&self) -> u8 {
        self.0[COMMAND_LEN - 1]
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<CommandFrame> for [u8; COMMAND_LEN] {
    fn from(frame: CommandFrame) -> Self {
        frame.0
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({:02X?})", self.0)
    }
}

pub fn encode_command(code: u8, data2: u8, data3: u8) -> CommandFrame {
    let mut bytes = [PRODUCT_ID, COMMAND_TYPE, code, data2, data3, 0];
    bytes[COMMAND_LEN - 1] = checksum(&bytes[..COMMAND_LEN - 1]);
    CommandFrame(bytes)
}

impl Command {
    pub fn encode(&self) -> CommandFrame {
        let (data2, data3) = self.data();
        encode_command(self.code(), data2, data3)
    }
}
