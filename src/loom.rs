use crate::config::{DynamicQueueConfig, QueueConfig, SpinPolicy};
use crate::loom_bindings::sync::Arc;
use crate::mpmc::{BoundedQueue, DynamicQueue, TicketQueue};
use crate::turn_sequencer::{SpinCutoff, TurnSequencer};

fn model(f: impl Fn() + Sync + Send + 'static) {
    let mut builder = loom::model::Builder::new();

    builder.preemption_bound = Some(3);
    builder.check(f);
}

fn loom_producer_consumer<Q, Cr>(creator: Cr, items: usize)
where
    Q: TicketQueue<usize> + Send + Sync + 'static,
    Cr: 'static + Sync + Send + Copy + Fn() -> Q,
{
    model(move || {
        let queue = Arc::new(creator());
        let producer = queue.clone();

        let th = loom::thread::spawn(move || {
            for i in 0..items {
                producer.blocking_write(i);
            }
        });

        for i in 0..items {
            assert_eq!(queue.blocking_read(), i);
        }

        th.join().unwrap();

        assert_eq!(queue.size(), 0);
    });
}

fn loom_two_producers<Q, Cr>(creator: Cr)
where
    Q: TicketQueue<usize> + Send + Sync + 'static,
    Cr: 'static + Sync + Send + Copy + Fn() -> Q,
{
    model(move || {
        let queue = Arc::new(creator());
        let producer1 = queue.clone();
        let producer2 = queue.clone();

        let th1 = loom::thread::spawn(move || producer1.blocking_write(1));
        let th2 = loom::thread::spawn(move || {
            let mut value = 2;

            while let Err(returned) = producer2.write(value) {
                value = returned;

                loom::thread::yield_now();
            }
        });

        let mut sum = 0;

        for _ in 0..2 {
            sum += queue.blocking_read();
        }

        th1.join().unwrap();
        th2.join().unwrap();

        assert_eq!(sum, 3);
        assert_eq!(queue.read(), None);
    });
}

#[test]
fn loom_turn_sequencer_handoff() {
    model(|| {
        let sequencer = Arc::new(TurnSequencer::new(0));
        let other = sequencer.clone();

        let th = loom::thread::spawn(move || {
            let cutoff = SpinCutoff::new(SpinPolicy::Fixed(0));

            for turn in [1, 3] {
                other.wait_for_turn(turn, &cutoff, false);
                other.complete_turn(turn);
            }
        });

        let cutoff = SpinCutoff::new(SpinPolicy::Fixed(0));

        for turn in [0, 2] {
            sequencer.wait_for_turn(turn, &cutoff, false);
            sequencer.complete_turn(turn);
        }

        th.join().unwrap();

        assert!(sequencer.is_turn(4));
    });
}

#[test]
fn loom_bounded_producer_consumer() {
    loom_producer_consumer(
        || {
            BoundedQueue::with_config(QueueConfig::new(1).spin_policy(SpinPolicy::Fixed(0)))
                .unwrap()
        },
        3,
    );
}

#[test]
fn loom_bounded_two_producers() {
    loom_two_producers(|| {
        BoundedQueue::with_config(QueueConfig::new(2).spin_policy(SpinPolicy::Fixed(0))).unwrap()
    });
}

#[test]
fn loom_dynamic_producer_consumer() {
    loom_producer_consumer(
        || {
            DynamicQueue::with_config(
                DynamicQueueConfig::new(4)
                    .min_capacity(1)
                    .expansion_multiplier(2)
                    .spin_policy(SpinPolicy::Fixed(0)),
            )
            .unwrap()
        },
        3,
    );
}

#[test]
fn loom_dynamic_two_producers() {
    loom_two_producers(|| {
        DynamicQueue::with_config(
            DynamicQueueConfig::new(2)
                .min_capacity(1)
                .spin_policy(SpinPolicy::Fixed(0)),
        )
        .unwrap()
    });
}
