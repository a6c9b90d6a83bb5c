mod delegate;
mod stack;
