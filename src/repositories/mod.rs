pub mod account;
pub mod memory;
pub mod postgres;

pub use account::AccountRepository;
pub use memory::InMemoryAccountRepository;
pub use postgres::PgAccountRepository;
