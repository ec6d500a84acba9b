//! Device identity owned by the session store.

use crate::crypto::KeyPair;
use crate::types::JID;

/// Identity of this linked client.
///
/// `id` is `None` until the device has been paired with an account; such a
/// device only exists in memory until [`Container::put_device`] saves it.
///
/// [`Container::put_device`]: crate::store::Container::put_device
#[derive(Debug, Clone)]
pub struct Device {
    pub id: Option<JID>,
    pub registration_id: u32,
    pub noise_key: KeyPair,
    pub identity_key: KeyPair,
    pub adv_secret_key: [u8; 32],
    pub platform: String,
    pub business_name: String,
    pub push_name: String,
}

impl Device {
    /// Fresh, unpaired device with newly generated keys.
    pub fn new() -> Self {
        Self {
            id: None,
            // 14 bits, never zero
            registration_id: (rand::random::<u32>() & 0x3FFF).max(1),
            noise_key: KeyPair::generate(),
            identity_key: KeyPair::generate(),
            adv_secret_key: rand::random(),
            platform: String::new(),
            business_name: String::new(),
            push_name: String::new(),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}
