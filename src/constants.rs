pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;

pub const DEFAULT_READ_SIZE: usize = 64 * KIB as usize;
pub const DEFAULT_MAX_BUFFER: usize = 64 * MIB as usize;

/// Seconds between the NTP epoch (1900-01-01) and the POSIX epoch.
pub const NTP_UNIX_DELTA: u64 = 2_208_988_800;

// SIO mule framing
pub const SIO_BLOCK_START: u8 = 0x01;
pub const SIO_HEADER_END: u8 = 0x02;
pub const SIO_BLOCK_END: u8 = 0x03;
pub const SIO_HEADER_LEN: usize = 33;

// Wire-following profiler engineering (E) file
pub const WFP_E_HEADER: [u8; 16] = [
    0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01,
];
pub const WFP_E_HEADER_LEN: usize = 24;
pub const WFP_SAMPLE_BYTES: usize = 30;
pub const WFP_STATUS_BYTES: usize = 16;
pub const WFP_AUGMENTED_STATUS_BYTES: usize = 18;
pub const WFP_STATUS_PREFIX: [u8; 3] = [0xFF, 0xFF, 0xFF];
pub const WFP_STATUS_LAST_MIN: u8 = 0xFA;
pub const WFP_STATUS_LAST_MAX: u8 = 0xFF;
