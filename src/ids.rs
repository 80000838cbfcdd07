use std::net::TcpListener;

// ---------------------------------------------------------------------------
// Rollout identifier generation
// ---------------------------------------------------------------------------

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the opaque identifier grouping the deployments of one rollout.
pub const IDENTIFIER_LEN: usize = 10;

/// Source of rollout identifiers. Injected so tests can pin a fixed sequence.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, len: usize) -> String;
}

#[derive(Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, len: usize) -> String {
        use rand::RngExt;

        let mut rng = rand::rng();
        (0..len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Port allocation
// ---------------------------------------------------------------------------

/// Source of free host ports for new backend/database deployments.
pub trait PortAllocator: Send + Sync {
    fn allocate(&self) -> std::io::Result<u16>;
}

/// Allocates by binding an ephemeral port on the loopback interface and
/// releasing it immediately. The port stays free until the container binds it.
#[derive(Debug, Default)]
pub struct EphemeralPortAllocator;

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> std::io::Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        let id = RandomIdGenerator.generate(IDENTIFIER_LEN);
        assert_eq!(id.len(), IDENTIFIER_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn consecutive_ids_differ() {
        // Collisions over 62^10 are not a realistic concern for two draws.
        assert_ne!(
            RandomIdGenerator.generate(IDENTIFIER_LEN),
            RandomIdGenerator.generate(IDENTIFIER_LEN)
        );
    }

    #[test]
    fn allocates_nonzero_port() {
        let port = EphemeralPortAllocator.allocate().unwrap();
        assert!(port > 0);
    }
}
