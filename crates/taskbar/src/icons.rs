//! Built-in icon bitmaps for taskbar applications.

use collections::FxHashMap;
use once_cell::sync::Lazy;

/// Monochrome glyph for taskbar buttons and menu rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major, one bit per pixel, each row padded to a whole byte.
    pub rows: Vec<u8>,
}

impl Bitmap {
    pub fn row_bytes(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }
}

/// Source of named application icons.
///
/// `load_icon` hands out a fresh copy every call; the caller owns the
/// bitmap and frees it whenever it likes.
pub trait IconProvider: Send + Sync {
    fn load_icon(&self, name: &str) -> Option<Bitmap>;
}

/// Icons compiled into the binary.
pub struct BuiltinIcons;

static ICONS: Lazy<FxHashMap<&'static str, Bitmap>> = Lazy::new(|| {
    let mut icons = FxHashMap::default();
    icons.insert("console", console_glyph());
    icons.insert("menu", menu_glyph());
    icons
});

impl IconProvider for BuiltinIcons {
    fn load_icon(&self, name: &str) -> Option<Bitmap> {
        ICONS.get(name).cloned()
    }
}

/// 16x16 shell prompt: a chevron and an underscore.
fn console_glyph() -> Bitmap {
    #[rustfmt::skip]
    let rows = vec![
        0x00, 0x00,
        0x00, 0x00,
        0x00, 0x00,
        0x40, 0x00,
        0x20, 0x00,
        0x10, 0x00,
        0x08, 0x00,
        0x10, 0x00,
        0x20, 0x00,
        0x40, 0x00,
        0x03, 0xf0,
        0x00, 0x00,
        0x00, 0x00,
        0x00, 0x00,
        0x00, 0x00,
        0x00, 0x00,
    ];
    Bitmap {
        width: 16,
        height: 16,
        rows,
    }
}

/// 16x16 main-menu glyph: three bars.
fn menu_glyph() -> Bitmap {
    let mut rows = vec![0u8; 32];
    for bar in [4usize, 8, 12] {
        rows[bar * 2] = 0x7f;
        rows[bar * 2 + 1] = 0xfe;
    }
    Bitmap {
        width: 16,
        height: 16,
        rows,
    }
}
