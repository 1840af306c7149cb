use minirpc_service::{MethodError, Service, ServiceBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

impl Args {
    pub fn new(num1: i64, num2: i64) -> Self {
        Self { num1, num2 }
    }

    fn checked_sum(&self) -> Result<i64, MethodError> {
        self.num1
            .checked_add(self.num2)
            .ok_or_else(|| "integer overflow".into())
    }
}

/// Sample service used by the tests, bench and demo app.
#[derive(Debug, Default)]
pub struct Foo;

impl Foo {
    pub const SUM: &'static str = "Foo.Sum";
    pub const DIV: &'static str = "Foo.Div";
    pub const SLEEP: &'static str = "Foo.Sleep";
    pub const RANGE: &'static str = "Foo.Range";
    pub const TALLY: &'static str = "Foo.Tally";

    /// Binds every exported method of `Foo`.
    pub fn service() -> ServiceBuilder<Foo> {
        Service::new(Foo)
            .method("Sum", Foo::sum)
            .method("Div", Foo::div)
            .method("Sleep", Foo::sleep)
            .method("Range", Foo::range)
            .method("Tally", Foo::tally)
    }

    pub fn sum(&self, args: Args, reply: &mut i64) -> Result<(), MethodError> {
        *reply = args.checked_sum()?;
        Ok(())
    }

    pub fn div(&self, args: Args, reply: &mut i64) -> Result<(), MethodError> {
        if args.num2 == 0 {
            return Err("divide by zero".into());
        }
        *reply = args
            .num1
            .checked_div(args.num2)
            .ok_or("integer overflow")?;
        Ok(())
    }

    /// Blocks for `num1` milliseconds, then sums.
    pub fn sleep(&self, args: Args, reply: &mut i64) -> Result<(), MethodError> {
        std::thread::sleep(Duration::from_millis(args.num1.max(0) as u64));
        *reply = args.checked_sum()?;
        Ok(())
    }

    /// Fills `reply` with `num1..num2`.
    pub fn range(&self, args: Args, reply: &mut Vec<i64>) -> Result<(), MethodError> {
        reply.extend(args.num1..args.num2);
        Ok(())
    }

    /// Counts occurrences of each word.
    pub fn tally(
        &self,
        words: Vec<String>,
        reply: &mut HashMap<String, u64>,
    ) -> Result<(), MethodError> {
        for word in words {
            *reply.entry(word).or_default() += 1;
        }
        Ok(())
    }
}
