mod secure;

pub use self::secure::*;
