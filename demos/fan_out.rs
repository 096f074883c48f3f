//! Fan-out examples for streamfan
//!
//! Run with: cargo run --example fan_out

use std::time::Duration;

use streamfan::prelude::*;
use tokio::runtime::Handle;

/// Example 1: Two readers see the same items
async fn broadcast_example() -> Result<()> {
    println!("=== Broadcast ===");

    let split = split(
        &Handle::current(),
        VecSource::new(vec!["a", "b", "c", "d"]).boxed(),
    );
    let (mut left, mut right) = split.split_pair();

    let (left, right) = tokio::join!(left.collect(), right.collect());
    println!("left:  {:?}", left?);
    println!("right: {:?}", right?);

    println!();
    Ok(())
}

/// Example 2: A slow reader holds the producer back
async fn backpressure_example() -> Result<()> {
    println!("=== Backpressure ===");

    let split = Split::with_config(
        &Handle::current(),
        IterSource::new(0..8).boxed(),
        SplitConfig::default().capacity(2),
    )?;
    let (mut fast, mut slow) = split.split_pair();

    let fast = async move {
        while let Some(item) = fast.next().await? {
            println!("fast got {}", item);
        }
        Ok::<_, Error>(())
    };
    let slow = async move {
        while let Some(item) = slow.next().await? {
            tokio::time::sleep(Duration::from_millis(20)).await;
            println!("slow got {}", item);
        }
        Ok::<_, Error>(())
    };
    let (a, b) = tokio::join!(fast, slow);
    a?;
    b?;

    println!();
    Ok(())
}

/// Example 3: Cancel by dropping every reader, then resume
async fn resume_example() -> Result<()> {
    println!("=== Resume After Cancel ===");

    let split = RepeatSource::times("tick", 6).split(&Handle::current());
    {
        let mut reader = split.reader();
        for _ in 0..2 {
            println!("first session: {:?}", reader.next().await?);
        }
    }

    while split.is_running() {
        tokio::task::yield_now().await;
    }
    println!("running after release: {}", split.is_running());

    let rest = split.reader().collect().await?;
    println!("second session: {:?}", rest);

    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    broadcast_example().await?;
    backpressure_example().await?;
    resume_example().await?;
    Ok(())
}
