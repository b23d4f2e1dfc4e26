// implementation of the sticky channel.
//
// the basic architecture is as such:
//
// channel handles wrap around Arc<shared state>
//                                 |
//          /----------------------/
//          v
//       shared state
//          |
//          |------ the buffer bound, fixed for the lifetime of the channel
//          |
//          \------ a mutex around lockable state:
//                     |
//                     |------ a VecDeque<T> of buffered elements, never longer than the bound
//                     |
//                     |------ a "send node queue": one node per pending write future. the node
//                     |       holds the element being written until it is either pushed into the
//                     |       buffer by its own future, or taken directly by a read future. the
//                     |       latter is how zero-capacity channels hand elements over.
//                     |
//                     |------ a "recv node queue": one node per pending read future.
//                     |
//                     \------ the sticky terminal state and the closed flag, which are only ever
//                             changed together with the queues under the same lock.
//
// blocking versions of operations are built as a layer on top of the futures, in the polling
// module, by parking the thread on a condvar that the future's waker notifies.
//
// the organization of these modules is as such:
//
//      waiter_queue<-----------core: The state machine. It presents an abstraction for channels
//                               ^    which is fully safe, but panicky and inconvenient.
//                               |
//      polling<----------------api: This is a wrapper around core that adapts it into an API that
//                               ^   is convenient and defensive. The crate re-exports this API
//                               |   publically.
//                               |
//                 view---------/ \--------intercept: read-only / write-only projections, and the
//                                                    relay task that pipes one channel into
//                                                    another.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod view;

mod waiter_queue;
mod polling;
mod core;
mod intercept;
