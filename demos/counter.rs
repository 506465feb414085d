//! Pushes a few ticks through a `pre`-based counter and prints the
//! sink trace, mirroring `tests/scenarios.rs` scenario 2.

use ripple::{compile, Value};

fn main() {
    env_logger::init();

    let mut graph = compile(
        "source tick:int:=0;
         stream counter<-pre(counter,0)+1;
         sink out<-counter;",
    )
    .unwrap();

    graph.subscribe("out", |name, value| {
        println!("{name} = {value}");
    });

    for tick in [1, 2, 3] {
        graph.push("tick", Value::Int(tick)).unwrap();
    }
}
