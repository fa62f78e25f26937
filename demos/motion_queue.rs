//! Motion queue example.
//!
//! Queues gestures at different priorities, runs an idle behavior between
//! them, and interrupts a long motion.
//!
//! Run with: cargo run --example motion_queue

use std::time::Duration;

use companion_runtime::{MotionCommand, MotionScheduler, Priority, SchedulerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let scheduler = MotionScheduler::new(SchedulerConfig::default());

    // Queued before start, so they run strictly by priority
    scheduler.execute_gesture("look_around", Priority::Low, |_| {
        println!("looking around");
        Ok(())
    });
    scheduler.execute_gesture("happy", Priority::Normal, |_| {
        println!("happy wiggle");
        Ok(())
    });
    scheduler.enqueue(
        MotionCommand::new("safety_stop", Priority::High, |_| {
            println!("safety stop");
            Ok(())
        })
        .uninterruptible(),
    );

    scheduler.set_idle_behavior(
        |_| {
            println!("breathing");
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        },
        true,
    );

    scheduler.start()?;
    std::thread::sleep(Duration::from_millis(500));

    // A long motion that checks for interruption between steps
    scheduler.execute_gesture("dance", Priority::Normal, |ctx| {
        for step in 0..50 {
            ctx.check_interrupted()?;
            println!("dance step {step}");
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    });

    std::thread::sleep(Duration::from_millis(400));
    if scheduler.interrupt_current() {
        println!("interrupted {:?}", scheduler.current_command());
    }

    std::thread::sleep(Duration::from_millis(300));
    scheduler.stop()?;

    Ok(())
}
