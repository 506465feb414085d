//! Loads a salary table from disk, then pushes a replacement table
//! straight in, mirroring `tests/scenarios.rs` scenario 7.

use ripple::{compile, Table, Value};

fn main() {
    env_logger::init();

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/fixtures/salary.csv");
    let source = format!(
        "source data:=load_csv(\"{path}\",true);
         stream avg<-avg(col(data,1));
         sink out<-avg;"
    );
    let mut graph = compile(&source).unwrap();
    println!("out = {}", graph.read("out").unwrap());

    let replacement = Value::table(Table {
        header: Some(vec!["name".into(), "salary".into()]),
        rows: vec![
            vec![Value::str("dave"), Value::Int(100)],
            vec![Value::str("erin"), Value::Int(200)],
            vec![Value::str("frank"), Value::Int(300)],
        ],
    });
    graph.push("data", replacement).unwrap();
    println!("out = {}", graph.read("out").unwrap());
}
