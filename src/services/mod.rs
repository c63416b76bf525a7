pub mod converter;
pub mod document_service;
pub mod extraction;
pub mod lifecycle;
pub mod nlp;
pub mod rewrite;
pub mod storage;
pub mod watchdog;
