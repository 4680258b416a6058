//! Fixed JDWP byte templates. Only the handshake and `VirtualMachine.Resume`
//! are ever sent, so there is no general packet encoder.

/// Sent verbatim by the debugger and echoed verbatim by the VM.
pub const HANDSHAKE: &[u8; 14] = b"JDWP-Handshake";

/// `VirtualMachine.Resume` command packet:
/// length=11, id=1, flags=0x00, command set=1, command=9, no data.
pub const RESUME_COMMAND: [u8; 11] = [
    0x00, 0x00, 0x00, 0x0b, // length
    0x00, 0x00, 0x00, 0x01, // id
    0x00, // flags
    0x01, // command set: VirtualMachine
    0x09, // command: Resume
];

/// A reply header is 11 bytes: length, id, flags, then a 2-byte error code.
pub const REPLY_LEN: usize = 11;

const ERROR_CODE_OFFSET: usize = 9;

/// Big-endian error code of a reply header. Zero means success.
pub fn reply_error_code(reply: &[u8; REPLY_LEN]) -> u16 {
    u16::from_be_bytes([reply[ERROR_CODE_OFFSET], reply[ERROR_CODE_OFFSET + 1]])
}
