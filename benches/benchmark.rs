use crate::generic_queue::{GenericQueue, MutexQueue};
use criterion::{criterion_group, criterion_main, Criterion};
use crossbeam_queue::ArrayQueue;
use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use ticketq::{BoundedQueue, DynamicQueue, TicketQueue};

pub(crate) mod generic_queue;

const CAPACITY: usize = 256;

// Single-threaded benchmark.
//
// `N` items are pushed and then popped from the queue.
pub fn push_pop<Q: GenericQueue<usize>, const N: usize>(name: &str, c: &mut Criterion) {
    let queue = Q::with_capacity(CAPACITY);

    c.bench_function(&format!("push_pop-{}", name), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                for i in 0..N {
                    let _ = queue.push(i);
                }

                for _ in 0..N {
                    black_box(queue.pop());
                }
            }

            start.elapsed() / N as _
        })
    });
}

// Multi-threaded benchmark.
//
// `THREADS` producers push `N` items each and `THREADS` consumers pop them,
// retrying on a full or an empty queue.
pub fn contended<Q: GenericQueue<usize>, const THREADS: usize, const N: usize>(
    name: &str,
    c: &mut Criterion,
) {
    c.bench_function(&format!("contended-{}", name), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;

            for _ in 0..iters {
                let queue = Arc::new(Q::with_capacity(CAPACITY));
                let barrier = Arc::new(Barrier::new(THREADS * 2 + 1));
                let mut handles = Vec::with_capacity(THREADS * 2);

                for _ in 0..THREADS {
                    let producer = queue.clone();
                    let barrier = barrier.clone();

                    handles.push(thread::spawn(move || {
                        barrier.wait();

                        for i in 0..N {
                            let mut item = i;

                            while let Err(returned) = producer.push(item) {
                                item = returned;

                                std::hint::spin_loop();
                            }
                        }
                    }));

                    let consumer = queue.clone();
                    let barrier = barrier.clone();

                    handles.push(thread::spawn(move || {
                        barrier.wait();

                        for _ in 0..N {
                            while consumer.pop().is_none() {
                                std::hint::spin_loop();
                            }
                        }
                    }));
                }

                barrier.wait();

                let start = Instant::now();

                for handle in handles {
                    handle.join().unwrap();
                }

                total += start.elapsed();
            }

            total / (THREADS * N) as _
        })
    });
}

// Multi-threaded benchmark of the parking path.
//
// One producer and one consumer use the blocking operations of a tiny queue,
// so most operations wait for a turn.
pub fn blocking_ping_pong<Q: TicketQueue<usize> + Send + Sync + 'static>(
    name: &str,
    creator: fn() -> Q,
    c: &mut Criterion,
) {
    const N: usize = 10_000;

    c.bench_function(&format!("blocking_ping_pong-{}", name), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;

            for _ in 0..iters {
                let queue = Arc::new(creator());
                let producer = queue.clone();
                let start = Instant::now();
                let handle = thread::spawn(move || {
                    for i in 0..N {
                        producer.blocking_write(i);
                    }
                });

                for _ in 0..N {
                    black_box(queue.blocking_read());
                }

                handle.join().unwrap();

                total += start.elapsed();
            }

            total / N as _
        })
    });
}

// region push_pop

pub fn push_pop_small_ticketq_bounded(c: &mut Criterion) {
    push_pop::<BoundedQueue<_>, 8>("small-ticketq_bounded", c);
}

pub fn push_pop_small_ticketq_dynamic(c: &mut Criterion) {
    push_pop::<DynamicQueue<_>, 8>("small-ticketq_dynamic", c);
}

pub fn push_pop_small_crossbeam_array_queue(c: &mut Criterion) {
    push_pop::<ArrayQueue<_>, 8>("small-crossbeam_array_queue", c);
}

pub fn push_pop_small_mutex_vec_deque(c: &mut Criterion) {
    push_pop::<MutexQueue<_>, 8>("small-mutex_vec_deque", c);
}

pub fn push_pop_large_ticketq_bounded(c: &mut Criterion) {
    push_pop::<BoundedQueue<_>, 256>("large-ticketq_bounded", c);
}

pub fn push_pop_large_ticketq_dynamic(c: &mut Criterion) {
    push_pop::<DynamicQueue<_>, 256>("large-ticketq_dynamic", c);
}

pub fn push_pop_large_crossbeam_array_queue(c: &mut Criterion) {
    push_pop::<ArrayQueue<_>, 256>("large-crossbeam_array_queue", c);
}

pub fn push_pop_large_mutex_vec_deque(c: &mut Criterion) {
    push_pop::<MutexQueue<_>, 256>("large-mutex_vec_deque", c);
}

// endregion

// region contended

pub fn contended_ticketq_bounded(c: &mut Criterion) {
    contended::<BoundedQueue<_>, 4, 50_000>("ticketq_bounded", c);
}

pub fn contended_ticketq_dynamic(c: &mut Criterion) {
    contended::<DynamicQueue<_>, 4, 50_000>("ticketq_dynamic", c);
}

pub fn contended_crossbeam_array_queue(c: &mut Criterion) {
    contended::<ArrayQueue<_>, 4, 50_000>("crossbeam_array_queue", c);
}

pub fn contended_mutex_vec_deque(c: &mut Criterion) {
    contended::<MutexQueue<_>, 4, 50_000>("mutex_vec_deque", c);
}

// endregion

// region blocking

pub fn blocking_ping_pong_ticketq_bounded(c: &mut Criterion) {
    blocking_ping_pong("ticketq_bounded", || BoundedQueue::new(2).unwrap(), c);
}

pub fn blocking_ping_pong_ticketq_dynamic(c: &mut Criterion) {
    blocking_ping_pong("ticketq_dynamic", || DynamicQueue::new(2).unwrap(), c);
}

// endregion

criterion_group!(
    push_pop_benchmark,
    push_pop_small_ticketq_bounded,
    push_pop_small_ticketq_dynamic,
    push_pop_small_crossbeam_array_queue,
    push_pop_small_mutex_vec_deque,
    push_pop_large_ticketq_bounded,
    push_pop_large_ticketq_dynamic,
    push_pop_large_crossbeam_array_queue,
    push_pop_large_mutex_vec_deque
);

criterion_group!(
    contended_benchmark,
    contended_ticketq_bounded,
    contended_ticketq_dynamic,
    contended_crossbeam_array_queue,
    contended_mutex_vec_deque
);

criterion_group!(
    blocking_benchmark,
    blocking_ping_pong_ticketq_bounded,
    blocking_ping_pong_ticketq_dynamic
);

criterion_main!(push_pop_benchmark, contended_benchmark, blocking_benchmark);
