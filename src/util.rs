use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use bincode::{config, Decode, Encode};

/// Save to file, using Bincode.
pub fn save<T: Encode>(path: &Path, data: &T) -> io::Result<()> {
    let encoded: Vec<u8> = bincode::encode_to_vec(data, config::standard())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut file = File::create(path)?;
    file.write_all(&encoded)?;
    Ok(())
}

/// Load from file, using Bincode.
pub fn load<T: Decode<()>>(path: &Path) -> io::Result<T> {
    let mut buffer = Vec::new();
    let mut file = File::open(path)?;
    file.read_to_end(&mut buffer)?;

    let (decoded, _len) = bincode::decode_from_slice(&buffer, config::standard())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(decoded)
}

/// Bit-pattern key that sorts ascending by *decreasing* distance. Valid for non-negative
/// distances, whose IEEE bit patterns are monotonic.
pub fn far_first_key(dist: f32) -> u32 {
    !dist.abs().to_bits()
}
