//! The 2-bit byte rotation AdvHD applies to `.ws2` entries.

const ROTATION: u32 = 2;

pub fn encrypt_in_place(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b = b.rotate_left(ROTATION);
    }
}

pub fn decrypt_in_place(data: &mut [u8]) {
    for b in data.iter_mut() {
        *b = b.rotate_right(ROTATION);
    }
}

pub fn encrypt(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    encrypt_in_place(&mut out);
    out
}

pub fn decrypt(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    decrypt_in_place(&mut out);
    out
}
