use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Read-only memory map over a whole file, used for large inputs.
pub struct MmapFileReader {
    _file: File,
    mmap: Mmap,
}

impl MmapFileReader {
    pub fn new<P: AsRef<Path>>(file_path: P) -> std::io::Result<Self> {
        let file = File::open(file_path)?;
        // SAFETY: the map is read-only and inputs are not modified while a run is in progress
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(MmapFileReader { _file: file, mmap })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl AsRef<[u8]> for MmapFileReader {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
