use std::sync::Arc;

use crate::{
    clients::{
        directory::DirectoryAdapter, health::HealthChecker, mail::MailTransport,
        template::TemplateResolver,
    },
    config::Config,
    queue::{Queue, Storage},
    services::{
        campaigns::CampaignsCollection,
        delivery::{CampaignDeliveryHandler, DeliveryHandler, JobRouter, MailDeliveryHandler},
        enqueuer::Enqueuer,
        messages::MessageFinder,
        strategy::Dispatcher,
    },
    worker::{PoolHandle, WorkerConfig, WorkerPool},
};

/// Every long-lived component, wired once from configuration.
pub struct Application {
    pub queue: Queue,
    pub enqueuer: Enqueuer,
    pub dispatcher: Arc<Dispatcher>,
    pub campaigns: CampaignsCollection,
    pub messages: MessageFinder,
    pub handler: Arc<dyn DeliveryHandler>,
    worker_config: WorkerConfig,
}

impl Application {
    pub fn build(
        config: &Config,
        storage: Arc<dyn Storage>,
        directory: Arc<dyn DirectoryAdapter>,
        templates: Arc<dyn TemplateResolver>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let queue = Queue::new(storage, config.queue_config());
        let enqueuer = Enqueuer::new(queue.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&directory),
            enqueuer.clone(),
            config.default_uaa_scopes.clone(),
        ));

        let campaigns = CampaignsCollection::new(
            Arc::clone(&directory),
            Arc::clone(&templates),
            queue.clone(),
            config.default_template_id.clone(),
        );

        let mail = MailDeliveryHandler::new(
            directory,
            templates,
            transport,
            config.default_template_id.clone(),
            config.sender.clone(),
        );

        let handler: Arc<dyn DeliveryHandler> = Arc::new(JobRouter::new(
            mail,
            CampaignDeliveryHandler::new(queue.clone(), Arc::clone(&dispatcher)),
        ));

        Self {
            messages: MessageFinder::new(queue.clone()),
            queue,
            enqueuer,
            dispatcher,
            campaigns,
            handler,
            worker_config: config.worker_config(),
        }
    }

    pub fn start_workers(&self) -> PoolHandle {
        WorkerPool::new(
            self.queue.clone(),
            Arc::clone(&self.handler),
            self.worker_config.clone(),
        )
        .start()
    }

    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::new(self.queue.clone())
    }
}
