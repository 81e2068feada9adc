use anyhow::Result;
use yrdmap::geometric::score_scale::{OutOfRangePolicy, ScoreScale};

/// Example: bucket colors of a few accuracy scores
fn main() -> Result<()> {
    let scale = ScoreScale::yrd_default();

    println!("Buckets:");
    for bucket in scale.buckets() {
        println!("  [{:>3}, {:>3})  {}", bucket.lower, bucket.upper, bucket.color);
    }

    println!("\nScores:");
    for score in [12.0, 20.0, 45.0, 68.5, 99.9, 100.0] {
        let fill = scale.resolve_fill("demo", score)?;
        println!("  {:>5} -> {}", score, fill.color);
    }

    let strict = ScoreScale::yrd_default().with_policy(OutOfRangePolicy::Reject);
    if let Err(e) = strict.resolve_fill("demo", 100.0) {
        println!("\nReject policy: {}", e);
    }

    Ok(())
}
