use sha1::{Digest, Sha1};

use crate::{
    header::Header,
    section::SectionStore,
    types::{SectionKind, BOOT_ID_SIZE, BOOT_ID_WORDS},
};

/// Digest the sections and their declared sizes with `D`, fitted to the
/// header `id` field. The device tree only takes part when it is present.
pub fn digest_with<D: Digest>(header: &Header, sections: &SectionStore) -> [u32; BOOT_ID_WORDS] {
    let mut hasher = D::new();
    for kind in SectionKind::ALL {
        if kind == SectionKind::DeviceTree && !sections.is_present(kind) {
            continue;
        }
        hasher.update(sections.get(kind).unwrap_or_default());
        hasher.update(header.section_size(kind).to_le_bytes());
    }
    let digest = hasher.finalize();

    let mut id = [0u8; BOOT_ID_SIZE];
    let len = digest.len().min(BOOT_ID_SIZE);
    id[0..len].copy_from_slice(&digest[0..len]);

    let mut words = [0; BOOT_ID_WORDS];
    for (word, chunk) in words.iter_mut().zip(id.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

pub fn compute_id(header: &Header, sections: &SectionStore) -> [u32; BOOT_ID_WORDS] {
    digest_with::<Sha1>(header, sections)
}

/// Store a freshly computed id in `header`.
pub fn bind(header: &mut Header, sections: &SectionStore) { header.id = compute_id(header, sections); }
