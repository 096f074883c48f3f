//! Fan-in examples for streamfan
//!
//! Run with: cargo run --example fan_in

use std::time::Duration;

use futures::future::ready;
use streamfan::prelude::*;
use tokio::runtime::Handle;

#[derive(Debug, Clone)]
enum Reading {
    Temperature(f32),
    Label(&'static str),
}

/// Example 1: Two paced sources merged in arrival order
async fn paced_example() -> Result<()> {
    println!("=== Paced Mix ===");

    let temperatures = DelaySource::new(
        VecSource::new(vec![20.5, 21.0, 21.4]),
        Duration::from_millis(70),
    )
    .map(|t| ready(Reading::Temperature(t)));
    let labels = DelaySource::new(
        VecSource::new(vec!["kitchen", "hall", "attic"]),
        Duration::from_millis(50),
    )
    .map(|l| ready(Reading::Label(l)));

    let mix = Mix::new(&Handle::current(), vec![temperatures.boxed(), labels.boxed()])?;
    let mut reader = mix.reader();
    while let Some(reading) = reader.next().await? {
        println!("{:?}", reading);
    }

    println!();
    Ok(())
}

/// Example 2: Competing workers sharing one mix
async fn competing_example() -> Result<()> {
    println!("=== Competing Readers ===");

    let mix = Mix::new(
        &Handle::current(),
        vec![
            IterSource::new(0..10).boxed(),
            IterSource::new(100..110).boxed(),
        ],
    )?;

    let workers: Vec<_> = (0..3)
        .map(|id| {
            let mut reader = mix.reader();
            tokio::spawn(async move {
                let mut handled = 0;
                while let Some(item) = reader.next().await? {
                    println!("worker {} took {}", id, item);
                    handled += 1;
                }
                Ok::<_, Error>(handled)
            })
        })
        .collect();

    for worker in workers {
        let handled = worker.await.map_err(|e| Error::custom(e.to_string()))??;
        println!("worker finished after {} items", handled);
    }

    println!();
    Ok(())
}

/// Example 3: A failing source under both failure policies
async fn failure_example() -> Result<()> {
    println!("=== Failure Policies ===");

    for policy in [FailurePolicy::Log, FailurePolicy::Propagate] {
        let flaky = VecSource::new(vec![1, 2]).chain(from_fn(|| async {
            Err::<Option<i32>, _>(Error::custom("sensor unplugged"))
        }));
        let steady = DelaySource::new(IterSource::new(10..13), Duration::from_millis(10));

        let mix = Mix::with_config(
            &Handle::current(),
            vec![flaky.boxed(), steady.boxed()],
            MixConfig::default().failure_policy(policy),
        )?;

        let mut reader = mix.reader();
        loop {
            match reader.next().await {
                Ok(Some(item)) => println!("{:?}: {}", policy, item),
                Ok(None) => break,
                Err(e) => println!("{:?}: error {}", policy, e),
            }
        }
        for failure in mix.failures() {
            println!("source #{} failed: {}", failure.index, failure.error);
        }
    }

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    paced_example().await?;
    competing_example().await?;
    failure_example().await?;
    Ok(())
}
