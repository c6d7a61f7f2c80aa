//! QR code pairing for WhatsApp authentication.
//!
//! Builds the rotating pairing codes for an unpaired device and renders a
//! code as a PNG (for the login endpoint) or as text (for the terminal).

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{ImageBuffer, Luma};
use qrcode::{render::unicode, Color, EcLevel, QrCode};
use thiserror::Error;

/// Side length of the rendered PNG in pixels.
pub const QR_IMAGE_SIZE: u32 = 256;

/// Quiet zone around the code, in modules.
const QUIET_ZONE: u32 = 4;

/// Number of codes handed out before pairing times out.
const CODES_PER_SESSION: usize = 6;

/// QR code errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QrError {
    #[error("QR generation failed: {0}")]
    Generation(String),
    #[error("PNG encoding failed: {0}")]
    Encoding(String),
}

/// Public key material advertised in pairing codes.
#[derive(Debug, Clone)]
pub struct PairingKeys {
    pub noise_public: [u8; 32],
    pub identity_public: [u8; 32],
    pub adv_secret: [u8; 32],
}

/// Generate the pairing codes for one pairing attempt.
/// Format: ref,noisePublicKey,identityPublicKey,advSecretKey
pub fn generate_codes(keys: &PairingKeys) -> Vec<String> {
    let noise_pub = BASE64.encode(keys.noise_public);
    let identity_pub = BASE64.encode(keys.identity_public);
    let adv_secret = BASE64.encode(keys.adv_secret);

    (0..CODES_PER_SESSION)
        .map(|_| {
            let ref_id = format!("2@{:X}", rand::random::<u64>());
            format!("{ref_id},{noise_pub},{identity_pub},{adv_secret}")
        })
        .collect()
}

/// How long the code at `index` stays valid. The first code lives longer.
pub fn code_timeout(index: usize) -> Duration {
    if index == 0 {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(20)
    }
}

/// Render a login code as a square grayscale PNG.
pub fn render_png(data: &str) -> Result<Vec<u8>, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| QrError::Generation(e.to_string()))?;

    let modules = code.width() as u32;
    let total = modules + QUIET_ZONE * 2;
    let colors = code.into_colors();

    let img = ImageBuffer::from_fn(QR_IMAGE_SIZE, QR_IMAGE_SIZE, |x, y| {
        let mx = x * total / QR_IMAGE_SIZE;
        let my = y * total / QR_IMAGE_SIZE;
        if mx < QUIET_ZONE || my < QUIET_ZONE {
            return Luma([255u8]);
        }
        let (col, row) = (mx - QUIET_ZONE, my - QUIET_ZONE);
        if col >= modules || row >= modules {
            return Luma([255u8]);
        }
        match colors[(row * modules + col) as usize] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| QrError::Encoding(e.to_string()))?;

    Ok(buf.into_inner())
}

/// Render QR code as text for terminal display.
pub fn render_ascii(data: &str) -> Result<String, QrError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| QrError::Generation(e.to_string()))?;

    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn keys() -> PairingKeys {
        PairingKeys {
            noise_public: [1; 32],
            identity_public: [2; 32],
            adv_secret: [3; 32],
        }
    }

    #[test]
    fn codes_rotate_with_fresh_refs() {
        let codes = generate_codes(&keys());
        assert_eq!(codes.len(), CODES_PER_SESSION);
        assert_ne!(codes[0], codes[1]);

        let parts: Vec<&str> = codes[0].split(',').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], BASE64.encode([1u8; 32]));
        assert_eq!(parts[3], BASE64.encode([3u8; 32]));
    }

    #[test]
    fn first_code_lives_longest() {
        assert_eq!(code_timeout(0), Duration::from_secs(60));
        assert_eq!(code_timeout(3), Duration::from_secs(20));
    }

    #[test]
    fn png_has_magic_and_fixed_size() {
        let png = render_png("2@ABCDEF,noise,identity,adv").unwrap();
        assert!(png.starts_with(PNG_MAGIC));

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), QR_IMAGE_SIZE);
        assert_eq!(decoded.height(), QR_IMAGE_SIZE);
    }

    #[test]
    fn oversized_payload_is_reported() {
        let huge = "x".repeat(8_000);
        assert!(matches!(render_png(&huge), Err(QrError::Generation(_))));
    }

    #[test]
    fn test_qr_ascii_render() {
        let result = render_ascii("test data");
        assert!(!result.unwrap().is_empty());
    }
}
