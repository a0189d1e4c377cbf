pub mod session_repository;
pub mod verification_repository;

pub use session_repository::SessionRepository;
pub use verification_repository::VerificationRepository;
