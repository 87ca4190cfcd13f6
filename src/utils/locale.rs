#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Ru,
}

impl Locale {
    pub fn from_language_code(code: Option<&str>) -> Self {
        let primary = code
            .and_then(|value| value.split('-').next())
            .map(|value| value.trim().to_lowercase());
        match primary.as_deref() {
            Some("ru") | Some("uk") | Some("be") | Some("kk") => Locale::Ru,
            _ => Locale::En,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
        }
    }
}

/// Every user-facing string for one locale. Templates use `{n}`, `{value}`
/// and `{date}` placeholders filled by [`fill`].
#[derive(Debug)]
pub struct Texts {
    pub commands: &'static str,
    pub welcome: &'static str,
    pub terms_private: &'static str,
    pub terms_group: &'static str,
    pub support: &'static str,
    pub trial_unavailable: &'static str,
    pub quota_exceeded: &'static str,
    pub payment_complete: &'static str,
    pub context_cleared: &'static str,
    pub skip_set: &'static str,
    pub skip_invalid: &'static str,
    pub mode_set: &'static str,
    pub mode_cleared: &'static str,
    pub temperature_set: &'static str,
    pub temperature_invalid: &'static str,
    pub context_depth_set: &'static str,
    pub context_depth_invalid: &'static str,
    pub status_active: &'static str,
    pub status_expired: &'static str,
    pub status_none: &'static str,
    pub unlocked: &'static str,
    pub invoice_title: &'static str,
    pub invoice_description: &'static str,
    pub invoice_label_private: &'static str,
    pub invoice_label_group: &'static str,
}

static EN: Texts = Texts {
    commands: "Paint <some>\nDraw <some>\nGoogle <some>\nReset\nSkip <n>\nMode <persona>\nTemperature <value>\nContext depth <n>\n/status\n/payment\n/terms\n/support",
    welcome: "Feel free to speak to me in any language. I can Paint <anything> you want. You can also send me an image and I will describe it in words (this may take up to 30 seconds). I can search Google for any information you need. Use /commands for more options.",
    terms_private: "After a payment of $3 you get access to the bot in this private chat for the paid period, with all features including Paint, Photo2Text and Google.",
    terms_group: "After a payment of $10 the bot is available to everyone in this group for the paid period, with all features including Paint, Photo2Text and Google.",
    support: "For refunds, cancellations and any other questions please contact {value}",
    trial_unavailable: "The free trial is not available. Please pay to keep chatting with the bot.",
    quota_exceeded: "The usage limit for this subscription has been reached. Please renew your subscription to continue.",
    payment_complete: "Payment complete! Thank you. The bot is now available until {date}.",
    context_cleared: "Context cleared",
    skip_set: "I will answer every {n} message(s)",
    skip_invalid: "Skip needs a whole number of 1 or more, e.g. \"skip 3\"",
    mode_set: "Mode set: {value}",
    mode_cleared: "Mode cleared",
    temperature_set: "Temperature set to {value}",
    temperature_invalid: "Temperature needs a number, e.g. \"temperature 36.6\"",
    context_depth_set: "Context depth set to {n}",
    context_depth_invalid: "Context depth needs a whole number of 1 or more, e.g. \"context depth 500\"",
    status_active: "Subscription active until {date}",
    status_expired: "Subscription expired on {date}",
    status_none: "No active subscription. Use /payment to subscribe.",
    unlocked: "The bot is unlocked until {date}",
    invoice_title: "Payment required",
    invoice_description: "Full access to the AI bot",
    invoice_label_private: "Full access to the private chat",
    invoice_label_group: "Full access to the group chat",
};

static RU: Texts = Texts {
    commands: "Нарисуй <что-то>\nЗагугли/Погугли <что-то>\nСброс\nПропуск <n>\nРежим <персона>\nТемпература <значение>\nГлубина контекста <n>\n/status\n/payment\n/terms\n/support",
    welcome: "Пишите мне на любом языке. Я умею рисовать: Нарисуй <что-то>. Пришлите картинку, и я опишу её словами (до 30 секунд). Могу поискать в Google. Все команды: /commands",
    terms_private: "После оплаты $3 бот доступен в этом личном чате на оплаченный период со всеми функциями: рисование, описание фото и поиск в Google.",
    terms_group: "После оплаты $10 бот доступен всем участникам группы на оплаченный период со всеми функциями: рисование, описание фото и поиск в Google.",
    support: "По вопросам возврата, отмены и любым другим вопросам пишите {value}",
    trial_unavailable: "Бесплатный пробный период недоступен. Оплатите доступ, чтобы продолжить общение с ботом.",
    quota_exceeded: "Лимит запросов по подписке исчерпан. Продлите подписку, чтобы продолжить.",
    payment_complete: "Оплата прошла! Спасибо. Бот доступен до {date}.",
    context_cleared: "Личность уничтожена",
    skip_set: "Отвечать раз в {n}",
    skip_invalid: "Укажите целое число от 1, например \"пропуск 3\"",
    mode_set: "Режим установлен: {value}",
    mode_cleared: "Режим сброшен",
    temperature_set: "Температура установлена в {value}",
    temperature_invalid: "Укажите число, например \"температура 36,6\"",
    context_depth_set: "Глубина контекста установлена в {n}",
    context_depth_invalid: "Укажите целое число от 1, например \"глубина контекста 500\"",
    status_active: "Подписка активна до {date}",
    status_expired: "Подписка закончилась {date}",
    status_none: "Нет активной подписки. Оформить: /payment",
    unlocked: "Бот активирован до {date}",
    invoice_title: "Требуется оплата",
    invoice_description: "Полный доступ к AI-боту",
    invoice_label_private: "Полный доступ в личном чате",
    invoice_label_group: "Полный доступ в групповом чате",
};

pub fn texts(locale: Locale) -> &'static Texts {
    match locale {
        Locale::En => &EN,
        Locale::Ru => &RU,
    }
}

pub fn fill(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(&format!("{{{placeholder}}}"), value)
}
