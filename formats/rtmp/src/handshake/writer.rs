use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use super::{C0S0Packet, C1S1Packet, C2S2Packet, Version, errors::HandshakeError};

pub struct Writer<W> {
    inner: W,
}

impl<W: io::Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_c0s0(&mut self, version: Version) -> Result<(), HandshakeError> {
        self.inner.write_u8(version.into())?;
        Ok(())
    }

    pub fn write_c1s1(&mut self, packet: C1S1Packet) -> Result<(), HandshakeError> {
        // wraps at u32 on purpose, matching the wire's 32-bit timestamp field
        self.inner
            .write_u32::<BigEndian>(packet.timestamp.as_millis() as u32)?;
        self.inner.write_u32::<BigEndian>(packet._zeros)?;
        self.inner.write_all(&packet.random_bytes)?;
        Ok(())
    }

    pub fn write_c2s2(&mut self, packet: C2S2Packet) -> Result<(), HandshakeError> {
        self.inner
            .write_u32::<BigEndian>(packet.timestamp.as_millis() as u32)?;
        self.inner
            .write_u32::<BigEndian>(packet.timestamp2.as_millis() as u32)?;
        self.inner.write_all(&packet.random_echo)?;
        Ok(())
    }
}
