mod random;
mod transcript;
