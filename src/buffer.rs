//! Frame buffers: pixel memory plus metadata.

use crate::memory::{HardwareBuffer, PooledHardwareBuffer};
use crate::metadata::Metadata;
use std::fmt;

/// Where a buffer's pixels live.
pub enum BufferMemory {
    /// Tightly packed host memory.
    Host(Vec<u8>),
    /// A device surface on loan from a pool.
    Pooled(PooledHardwareBuffer),
    /// A device surface owned by the buffer.
    Surface(HardwareBuffer),
}

impl fmt::Debug for BufferMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(bytes) => f.debug_tuple("Host").field(&bytes.len()).finish(),
            Self::Pooled(buffer) => f.debug_tuple("Pooled").field(buffer).finish(),
            Self::Surface(buffer) => f.debug_tuple("Surface").field(buffer).finish(),
        }
    }
}

/// A frame buffer.
///
/// # Example
///
/// ```rust
/// use parallax_stabilize::buffer::Buffer;
/// use parallax_stabilize::metadata::Metadata;
///
/// let buffer = Buffer::host(vec![0u8; 16], Metadata::with_sequence(0));
/// assert!(!buffer.is_hardware());
/// assert_eq!(buffer.as_host().map(<[u8]>::len), Some(16));
/// ```
#[derive(Debug)]
pub struct Buffer {
    memory: BufferMemory,
    metadata: Metadata,
}

impl Buffer {
    /// Create a buffer.
    pub fn new(memory: BufferMemory, metadata: Metadata) -> Self {
        Self { memory, metadata }
    }

    /// Create a host buffer.
    pub fn host(bytes: Vec<u8>, metadata: Metadata) -> Self {
        Self::new(BufferMemory::Host(bytes), metadata)
    }

    /// Create a buffer backed by a pooled surface.
    pub fn pooled(buffer: PooledHardwareBuffer, metadata: Metadata) -> Self {
        Self::new(BufferMemory::Pooled(buffer), metadata)
    }

    /// Get a reference to the metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Get the memory.
    pub fn memory(&self) -> &BufferMemory {
        &self.memory
    }

    /// True when the pixels live on the device.
    pub fn is_hardware(&self) -> bool {
        !matches!(self.memory, BufferMemory::Host(_))
    }

    /// Host bytes, if host-resident.
    pub fn as_host(&self) -> Option<&[u8]> {
        match &self.memory {
            BufferMemory::Host(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Mutable host bytes, if host-resident.
    pub fn as_host_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.memory {
            BufferMemory::Host(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Device surface, if hardware-resident.
    pub fn as_hardware(&self) -> Option<&HardwareBuffer> {
        match &self.memory {
            BufferMemory::Host(_) => None,
            BufferMemory::Pooled(buffer) => Some(buffer),
            BufferMemory::Surface(buffer) => Some(buffer),
        }
    }

    /// Mutable device surface, if hardware-resident.
    pub fn as_hardware_mut(&mut self) -> Option<&mut HardwareBuffer> {
        match &mut self.memory {
            BufferMemory::Host(_) => None,
            BufferMemory::Pooled(buffer) => buffer.buffer_mut(),
            BufferMemory::Surface(buffer) => Some(buffer),
        }
    }

    /// Split into memory and metadata.
    pub fn into_parts(self) -> (BufferMemory, Metadata) {
        (self.memory, self.metadata)
    }
}
