use std::cell::Cell;
use std::io::ErrorKind;
use std::rc::Rc;

use crate::stack::{page_size, DEFAULT_STACK_SIZE, MIN_STACK_SIZE, STACK_ALIGNMENT};
use crate::Coroutine;

#[test]
fn page_size_is_sane() {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    assert_eq!(DEFAULT_STACK_SIZE % page_size, 0);
    assert!(STACK_ALIGNMENT.is_power_of_two());
}

#[test]
fn default_stack() {
    let coroutine = Coroutine::<i32>::new(|_| 0).unwrap();
    assert_eq!(coroutine.stack_size(), DEFAULT_STACK_SIZE);
    assert_eq!(coroutine.stack_base().get() % page_size(), 0);
    coroutine.close().unwrap();
}

#[test]
fn custom_size() {
    let size = 4 * page_size().max(MIN_STACK_SIZE);
    let mut coroutine = Coroutine::<i32>::with_stack_size(size, |y| y.suspend(1) + 1).unwrap();
    assert_eq!(coroutine.stack_size(), size);
    assert_eq!(coroutine.resume(0), 1);
    assert_eq!(coroutine.resume(41), 42);
    coroutine.close().unwrap();
}

#[test]
fn smallest_size() {
    let size = page_size().max(MIN_STACK_SIZE);
    let mut coroutine = Coroutine::<i32>::with_stack_size(size, |y| {
        let mut sum = 0;
        for i in 0..10 {
            sum += y.suspend(i);
        }
        sum
    })
    .unwrap();
    let mut sent = 0;
    while !coroutine.finished() {
        sent = coroutine.resume(sent);
    }
    assert_eq!(sent, (0..10).sum::<i32>());
    coroutine.close().unwrap();
}

#[test]
fn invalid_sizes() {
    let page_size = page_size();
    for size in [0, 1, MIN_STACK_SIZE - 1, page_size + 1, DEFAULT_STACK_SIZE - 16] {
        let err = Coroutine::<i32>::with_stack_size(size, |_| 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}

#[test]
fn many_coroutines() {
    let mut coroutines = (0..64)
        .map(|i| Coroutine::<usize>::new(move |y| y.suspend(i) * 2).unwrap())
        .collect::<Vec<_>>();
    for (i, coroutine) in coroutines.iter_mut().enumerate() {
        assert_eq!(coroutine.resume(0), i);
    }
    for (i, coroutine) in coroutines.iter_mut().enumerate().rev() {
        assert_eq!(coroutine.resume(i), 2 * i);
    }
    for coroutine in coroutines {
        assert!(coroutine.finished());
        coroutine.close().unwrap();
    }
}

#[test]
fn large_body() {
    let mut big = [0u8; 2048];
    big[0] = 7;
    big[2047] = 9;
    let mut coroutine = Coroutine::<i64>::new(move |y| {
        y.suspend(big[0] as i64);
        big.iter().map(|&b| b as i64).sum()
    })
    .unwrap();
    assert_eq!(coroutine.resume(0), 7);
    assert_eq!(coroutine.resume(0), 16);
    coroutine.close().unwrap();

    // A large body that never runs is still dropped on close.
    let dropped = Rc::new(Cell::new(false));
    let guard = SetOnDrop(dropped.clone());
    let coroutine = Coroutine::<i64>::with_stack_size(page_size().max(MIN_STACK_SIZE), move |_| {
        drop(guard);
        big[1] as i64
    })
    .unwrap();
    coroutine.close().unwrap();
    assert!(dropped.get());
}

#[test]
fn large_value() {
    #[derive(Clone, PartialEq, Debug)]
    struct Big([u64; 200]);

    impl Default for Big {
        fn default() -> Self {
            Big([0; 200])
        }
    }

    let mut coroutine = Coroutine::<Big>::new(|y| {
        let input = y.suspend(Big([1; 200]));
        Big(input.0.map(|x| x * 2))
    })
    .unwrap();
    assert_eq!(coroutine.resume(Big::default()), Big([1; 200]));
    assert_eq!(coroutine.resume(Big([21; 200])), Big([42; 200]));
    assert_eq!(coroutine.return_value(), Some(&Big([42; 200])));
    assert_eq!(coroutine.resume(Big([5; 200])), Big::default());
    coroutine.close().unwrap();
}

struct SetOnDrop(Rc<Cell<bool>>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set(true);
    }
}
