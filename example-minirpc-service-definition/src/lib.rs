mod foo;
pub use foo::*;
