extern crate env_logger;
extern crate regex;
extern crate tk_carbon_pool;
extern crate tokio_core;

use std::env::args;
use std::io::{self, BufRead};
use std::process::exit;

use regex::Regex;
use tk_carbon_pool::{Config, MetricRecord, Sender};
use tokio_core::reactor::Core;


fn main() {
    env_logger::init().expect("init logging");
    let mut args = args().skip(1);
    let endpoint = args.next().unwrap_or("localhost:2003".to_string());
    let timeout_ms = args.next()
        .map(|x| x.parse().expect("timeout is an integer (milliseconds)"))
        .unwrap_or(1000);

    let mut core = Core::new().expect("create loop");
    let config = Config::new()
        .endpoint(&endpoint)
        .timeout_ms(timeout_ms)
        .done();
    let sender = match Sender::new(&config, &core.handle()) {
        Ok(sender) => sender,
        Err(e) => {
            eprintln!("Carbon config error: {}", e);
            exit(2);
        }
    };

    let regex = Regex::new(r"^([a-zA-Z0-9\.-]+)(?:\s+(-?[0-9.]+))$").unwrap();
    println!("Enter `metric.name 134`, several per line separated by `,`:");

    for line in io::BufReader::new(io::stdin()).lines() {
        let line = match line {
            Ok(x) => x,
            Err(_) => break,
        };
        let mut batch = Vec::new();
        for item in line.split(',') {
            if let Some(capt) = regex.captures(item.trim()) {
                let name = capt.get(1).unwrap().as_str();
                let value: f64 = match capt.get(2).unwrap().as_str().parse() {
                    Ok(v) => v,
                    Err(_) => {
                        println!("Invalid value in {:?}", item);
                        continue;
                    }
                };
                batch.push(MetricRecord::now(format!("test.{}", name), value));
            } else {
                println!("Invalid format. Use `metric.name 1235`.");
            }
        }
        if batch.is_empty() {
            continue;
        }
        match core.run(sender.send(&batch)) {
            Ok(report) => println!("Sent {} metrics ({} dropped), {} bytes, \
                {} idle connections",
                report.accepted, report.dropped, report.bytes,
                sender.idle_connections()),
            Err(e) => println!("Carbon error: {}", e),
        }
    }
    sender.shutdown();
}
