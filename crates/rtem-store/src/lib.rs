mod memory;

pub use memory::InMemoryRecordStore;
